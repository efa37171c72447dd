mod common;

use {
    common::*,
    payrec::domain::error::HandlerError,
    payrec::domain::money::{Currency, Money},
    payrec::domain::payment::{Payment, PaymentState},
    payrec::handlers::{CardPaymentHandler, HandlerRegistry},
    payrec::services::card_sync::update_card_payment_states,
    std::sync::Arc,
};

fn initialized_card(account: &payrec::domain::account::Account, identifier: &str) -> Payment {
    Payment::new_card(
        account.clone(),
        identifier,
        Money::from_minor(10_000, Currency::Czk),
        "Domain registration",
        "12345",
        "cards",
        "gateway",
        "created",
    )
}

fn handlers(gateway: Arc<FakeGateway>) -> HandlerRegistry {
    HandlerRegistry::new(vec![gateway as Arc<dyn CardPaymentHandler>])
}

#[tokio::test]
async fn confirmed_payment_becomes_ready_to_process() {
    let (store, account) = store_with_account("123456/0300").await;
    let payment = initialized_card(&account, "pi_1");
    insert(&store, &payment).await;

    let gateway = Arc::new(FakeGateway::new("gateway"));
    gateway.respond("pi_1", PaymentState::ReadyToProcess, "succeeded");

    let stats = update_card_payment_states(&store, &handlers(gateway), None, None)
        .await
        .unwrap();
    assert_eq!(stats.updated, 1);

    let stored = fetch(&store, &payment).await;
    assert_eq!(stored.state, PaymentState::ReadyToProcess);
    assert_eq!(stored.card_gateway_state, "succeeded");
}

#[tokio::test]
async fn canceled_payment_is_terminal() {
    let (store, account) = store_with_account("123456/0300").await;
    let payment = initialized_card(&account, "pi_1");
    insert(&store, &payment).await;

    let gateway = Arc::new(FakeGateway::new("gateway"));
    gateway.respond("pi_1", PaymentState::Canceled, "canceled");

    update_card_payment_states(&store, &handlers(gateway), None, None)
        .await
        .unwrap();
    assert_eq!(fetch(&store, &payment).await.state, PaymentState::Canceled);
}

#[tokio::test]
async fn gateway_status_is_recorded_even_without_a_transition() {
    let (store, account) = store_with_account("123456/0300").await;
    let payment = initialized_card(&account, "pi_1");
    insert(&store, &payment).await;

    let gateway = Arc::new(FakeGateway::new("gateway"));
    gateway.respond("pi_1", PaymentState::Initialized, "processing");

    update_card_payment_states(&store, &handlers(gateway), None, None)
        .await
        .unwrap();

    let stored = fetch(&store, &payment).await;
    assert_eq!(stored.state, PaymentState::Initialized);
    assert_eq!(stored.card_gateway_state, "processing");
}

#[tokio::test]
async fn settled_payments_are_never_pulled_back() {
    let (store, account) = store_with_account("123456/0300").await;
    let mut payment = initialized_card(&account, "pi_1");
    payment.mark_processed_by("cards", None);
    insert(&store, &payment).await;

    let gateway = Arc::new(FakeGateway::new("gateway"));
    gateway.respond("pi_1", PaymentState::Canceled, "canceled");

    let stats = update_card_payment_states(&store, &handlers(gateway), None, None)
        .await
        .unwrap();
    // Not INITIALIZED, so the sync job never even selects it.
    assert_eq!(stats.updated, 0);
    assert_eq!(fetch(&store, &payment).await.state, PaymentState::Processed);
}

#[tokio::test]
async fn one_failing_payment_does_not_stop_the_job() {
    let (store, account) = store_with_account("123456/0300").await;
    let mut failing = initialized_card(&account, "pi_1");
    failing.create_time -= chrono::Duration::seconds(10);
    let healthy = initialized_card(&account, "pi_2");
    insert(&store, &failing).await;
    insert(&store, &healthy).await;

    let gateway = Arc::new(FakeGateway::new("gateway"));
    gateway.fail("pi_1", HandlerError::Connection("refused".into()));
    gateway.respond("pi_2", PaymentState::ReadyToProcess, "succeeded");

    let stats = update_card_payment_states(&store, &handlers(gateway), None, None)
        .await
        .unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.updated, 1);

    assert_eq!(
        fetch(&store, &failing).await.state,
        PaymentState::Initialized
    );
    assert_eq!(
        fetch(&store, &healthy).await.state,
        PaymentState::ReadyToProcess
    );
}

#[tokio::test]
async fn protocol_failure_leaves_state_untouched() {
    let (store, account) = store_with_account("123456/0300").await;
    let payment = initialized_card(&account, "pi_1");
    insert(&store, &payment).await;

    let gateway = Arc::new(FakeGateway::new("gateway"));
    gateway.fail("pi_1", HandlerError::Protocol("unexpected result code".into()));

    let stats = update_card_payment_states(&store, &handlers(gateway), None, None)
        .await
        .unwrap();
    assert_eq!(stats.failed, 1);

    let stored = fetch(&store, &payment).await;
    assert_eq!(stored.state, PaymentState::Initialized);
    assert_eq!(stored.card_gateway_state, "created");
}

#[tokio::test]
async fn unknown_handler_is_logged_and_skipped() {
    let (store, account) = store_with_account("123456/0300").await;
    let mut payment = initialized_card(&account, "pi_1");
    payment.card_handler = "decommissioned".to_string();
    insert(&store, &payment).await;

    let gateway = Arc::new(FakeGateway::new("gateway"));
    let stats = update_card_payment_states(&store, &handlers(gateway), None, None)
        .await
        .unwrap();
    assert_eq!(stats.skipped, 1);
    assert_eq!(
        fetch(&store, &payment).await.state,
        PaymentState::Initialized
    );
}

#[tokio::test]
async fn time_window_bounds_the_selection() {
    let (store, account) = store_with_account("123456/0300").await;
    let mut old = initialized_card(&account, "pi_old");
    old.create_time -= chrono::Duration::days(30);
    let recent = initialized_card(&account, "pi_new");
    insert(&store, &old).await;
    insert(&store, &recent).await;

    let gateway = Arc::new(FakeGateway::new("gateway"));
    gateway.respond("pi_new", PaymentState::ReadyToProcess, "succeeded");

    let from = recent.create_time - chrono::Duration::days(1);
    let stats = update_card_payment_states(&store, &handlers(gateway), Some(from), None)
        .await
        .unwrap();
    assert_eq!(stats.updated, 1);
    assert_eq!(fetch(&store, &old).await.state, PaymentState::Initialized);
}
