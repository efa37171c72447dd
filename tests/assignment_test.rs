mod common;

use {
    common::*,
    chrono::NaiveDate,
    payrec::domain::error::AssignmentError,
    payrec::domain::payment::{PaymentState, ProcessingError},
    payrec::processors::{AssignmentContext, ProcessPaymentResult},
    payrec::services::assignment::assign_payment,
    std::sync::Arc,
    uuid::Uuid,
};

#[tokio::test]
async fn accepted_assignment_processes_the_payment() {
    let (store, account) = store_with_account("123456/0300").await;
    let payment = transfer_payment(&account, "PID1");
    insert(&store, &payment).await;

    let registry = registry(vec![("manual", Arc::new(AcceptAll))]);
    let ctx = AssignmentContext {
        client_id: "CLIENT-7".to_string(),
        tax_date: None,
    };
    assign_payment(&store, &registry, payment.uuid, "manual", ctx)
        .await
        .unwrap();

    let stored = fetch(&store, &payment).await;
    assert_eq!(stored.state, PaymentState::Processed);
    assert_eq!(stored.processor, "manual");
}

#[tokio::test]
async fn rejected_assignment_leaves_the_payment_untouched() {
    let (store, account) = store_with_account("123456/0300").await;
    let payment = transfer_payment(&account, "PID1");
    insert(&store, &payment).await;

    let registry = registry(vec![("manual", Arc::new(RejectAll))]);
    let err = assign_payment(
        &store,
        &registry,
        payment.uuid,
        "manual",
        AssignmentContext::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AssignmentError::Rejected));

    let stored = fetch(&store, &payment).await;
    assert_eq!(stored.state, PaymentState::ReadyToProcess);
    assert_eq!(stored.processor, "");
}

#[tokio::test]
async fn assignment_records_diagnostic_on_acceptance() {
    let (store, account) = store_with_account("123456/0300").await;
    let payment = transfer_payment(&account, "PID1");
    insert(&store, &payment).await;

    let registry = registry(vec![(
        "manual",
        Arc::new(VerdictProcessor(ProcessPaymentResult::accept_with(
            ProcessingError::TooOld,
        ))),
    )]);
    assign_payment(
        &store,
        &registry,
        payment.uuid,
        "manual",
        AssignmentContext::default(),
    )
    .await
    .unwrap();

    let stored = fetch(&store, &payment).await;
    assert_eq!(stored.state, PaymentState::Processed);
    assert_eq!(stored.processing_error, Some(ProcessingError::TooOld));
}

#[tokio::test]
async fn missing_tax_date_is_a_distinct_failure() {
    let (store, account) = store_with_account("123456/0300").await;
    let payment = transfer_payment(&account, "PID1");
    insert(&store, &payment).await;

    let registry = registry(vec![("invoices", Arc::new(TaxDateProcessor))]);
    let err = assign_payment(
        &store,
        &registry,
        payment.uuid,
        "invoices",
        AssignmentContext::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AssignmentError::InvalidTaxDate(_)));
    assert_eq!(
        fetch(&store, &payment).await.state,
        PaymentState::ReadyToProcess
    );
}

#[tokio::test]
async fn tax_date_before_the_payment_is_rejected_by_the_processor() {
    let (store, account) = store_with_account("123456/0300").await;
    let payment = transfer_payment(&account, "PID1");
    insert(&store, &payment).await;

    let registry = registry(vec![("invoices", Arc::new(TaxDateProcessor))]);
    let ctx = AssignmentContext {
        client_id: String::new(),
        tax_date: NaiveDate::from_ymd_opt(2026, 2, 1),
    };
    let err = assign_payment(&store, &registry, payment.uuid, "invoices", ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, AssignmentError::InvalidTaxDate(_)));
}

#[tokio::test]
async fn valid_tax_date_assigns() {
    let (store, account) = store_with_account("123456/0300").await;
    let payment = transfer_payment(&account, "PID1");
    insert(&store, &payment).await;

    let registry = registry(vec![("invoices", Arc::new(TaxDateProcessor))]);
    let ctx = AssignmentContext {
        client_id: String::new(),
        tax_date: NaiveDate::from_ymd_opt(2026, 3, 15),
    };
    assign_payment(&store, &registry, payment.uuid, "invoices", ctx)
        .await
        .unwrap();
    assert_eq!(fetch(&store, &payment).await.state, PaymentState::Processed);
}

#[tokio::test]
async fn settled_payments_cannot_be_reassigned() {
    let (store, account) = store_with_account("123456/0300").await;
    let mut payment = transfer_payment(&account, "PID1");
    payment.mark_processed_by("earlier", None);
    insert(&store, &payment).await;

    let registry = registry(vec![("manual", Arc::new(AcceptAll))]);
    let err = assign_payment(
        &store,
        &registry,
        payment.uuid,
        "manual",
        AssignmentContext::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AssignmentError::NotAssignable(_)));
    assert_eq!(fetch(&store, &payment).await.processor, "earlier");
}

#[tokio::test]
async fn unknown_processor_is_a_validation_failure() {
    let (store, account) = store_with_account("123456/0300").await;
    let payment = transfer_payment(&account, "PID1");
    insert(&store, &payment).await;

    let registry = registry(vec![("manual", Arc::new(AcceptAll))]);
    let err = assign_payment(
        &store,
        &registry,
        payment.uuid,
        "nonexistent",
        AssignmentContext::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AssignmentError::UnknownProcessor(_)));
}

#[tokio::test]
async fn missing_payment_is_reported() {
    let (store, _account) = store_with_account("123456/0300").await;
    let registry = registry(vec![("manual", Arc::new(AcceptAll))]);
    let err = assign_payment(
        &store,
        &registry,
        Uuid::now_v7(),
        "manual",
        AssignmentContext::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AssignmentError::NotFound(_)));
}

#[tokio::test]
async fn broken_processor_surfaces_as_assignment_failure() {
    let (store, account) = store_with_account("123456/0300").await;
    let payment = transfer_payment(&account, "PID1");
    insert(&store, &payment).await;

    let registry = registry(vec![("manual", Arc::new(Broken))]);
    let err = assign_payment(
        &store,
        &registry,
        payment.uuid,
        "manual",
        AssignmentContext::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AssignmentError::Failed(_)));
    assert_eq!(
        fetch(&store, &payment).await.state,
        PaymentState::ReadyToProcess
    );
}
