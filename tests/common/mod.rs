#![allow(dead_code)]

use {
    async_trait::async_trait,
    payrec::domain::account::{Account, AccountNumber},
    payrec::domain::error::{HandlerError, ProcessorError},
    payrec::domain::money::{Currency, Money},
    payrec::domain::payment::{Payment, PaymentState, StatementRecord},
    payrec::domain::store::PaymentStore,
    payrec::handlers::{CardPaymentHandler, CartItem},
    payrec::infra::memory::InMemoryStore,
    payrec::processors::{
        AssignError, AssignmentContext, PaymentProcessor, ProcessPaymentResult,
        ProcessorRegistry,
    },
    std::collections::HashMap,
    std::sync::{Arc, Mutex},
};

pub fn czk_account(number: &str) -> Account {
    Account::new(AccountNumber::new(number), "Main account", Currency::Czk)
}

pub async fn store_with_account(number: &str) -> (InMemoryStore, Account) {
    let store = InMemoryStore::new();
    let account = czk_account(number);
    store.insert_account(&account).await.unwrap();
    (store, account)
}

pub fn transfer_record(identifier: &str, minor: i64) -> StatementRecord {
    StatementRecord {
        identifier: identifier.to_string(),
        counter_account_number: Some("999/0100".to_string()),
        counter_account_name: Some("Counterparty".to_string()),
        amount: Money::from_minor(minor, Currency::Czk),
        transaction_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 10),
        description: None,
        constant_symbol: None,
        variable_symbol: Some("12345".to_string()),
        specific_symbol: None,
    }
}

pub fn transfer_payment(account: &Account, identifier: &str) -> Payment {
    Payment::from_statement(account.clone(), transfer_record(identifier, 10_000))
}

pub fn card_payment(account: &Account, identifier: &str, processor: &str) -> Payment {
    let mut payment = Payment::new_card(
        account.clone(),
        identifier,
        Money::from_minor(10_000, Currency::Czk),
        "Domain registration",
        "12345",
        processor,
        "test-gateway",
        "requires_payment_method",
    );
    payment.state = PaymentState::ReadyToProcess;
    payment
}

pub async fn insert(store: &InMemoryStore, payment: &Payment) {
    store.insert_payment(payment).await.unwrap();
}

pub async fn fetch(store: &InMemoryStore, payment: &Payment) -> Payment {
    store.payment_by_uuid(payment.uuid).await.unwrap().unwrap()
}

pub fn registry(entries: Vec<(&str, Arc<dyn PaymentProcessor>)>) -> ProcessorRegistry {
    ProcessorRegistry::new(
        entries
            .into_iter()
            .map(|(name, processor)| (name.to_string(), processor))
            .collect(),
    )
}

/// Accepts every payment, both automatically and manually.
pub struct AcceptAll;

#[async_trait]
impl PaymentProcessor for AcceptAll {
    fn default_objective(&self) -> &'static str {
        "Accept everything"
    }

    async fn process_payments(
        &self,
        payments: Vec<Payment>,
    ) -> Result<Vec<ProcessPaymentResult>, ProcessorError> {
        Ok(payments
            .iter()
            .map(|_| ProcessPaymentResult::accept())
            .collect())
    }

    async fn assign_payment(
        &self,
        _payment: Payment,
        _ctx: &AssignmentContext,
    ) -> Result<ProcessPaymentResult, AssignError> {
        Ok(ProcessPaymentResult::accept())
    }
}

/// Rejects every payment, both automatically and manually.
pub struct RejectAll;

#[async_trait]
impl PaymentProcessor for RejectAll {
    fn default_objective(&self) -> &'static str {
        "Reject everything"
    }

    async fn process_payments(
        &self,
        payments: Vec<Payment>,
    ) -> Result<Vec<ProcessPaymentResult>, ProcessorError> {
        Ok(payments
            .iter()
            .map(|_| ProcessPaymentResult::reject())
            .collect())
    }

    async fn assign_payment(
        &self,
        _payment: Payment,
        _ctx: &AssignmentContext,
    ) -> Result<ProcessPaymentResult, AssignError> {
        Ok(ProcessPaymentResult::reject())
    }
}

/// Fails as a whole; the scheduler must skip it and move on.
pub struct Broken;

#[async_trait]
impl PaymentProcessor for Broken {
    fn default_objective(&self) -> &'static str {
        "Broken"
    }

    async fn process_payments(
        &self,
        _payments: Vec<Payment>,
    ) -> Result<Vec<ProcessPaymentResult>, ProcessorError> {
        Err(ProcessorError("database of the remote system is down".into()))
    }

    async fn assign_payment(
        &self,
        _payment: Payment,
        _ctx: &AssignmentContext,
    ) -> Result<ProcessPaymentResult, AssignError> {
        Err(ProcessorError("database of the remote system is down".into()).into())
    }
}

/// Returns the given verdict for every payment.
pub struct VerdictProcessor(pub ProcessPaymentResult);

#[async_trait]
impl PaymentProcessor for VerdictProcessor {
    fn default_objective(&self) -> &'static str {
        "Fixed verdict"
    }

    async fn process_payments(
        &self,
        payments: Vec<Payment>,
    ) -> Result<Vec<ProcessPaymentResult>, ProcessorError> {
        Ok(payments.iter().map(|_| self.0).collect())
    }

    async fn assign_payment(
        &self,
        _payment: Payment,
        _ctx: &AssignmentContext,
    ) -> Result<ProcessPaymentResult, AssignError> {
        Ok(self.0)
    }
}

/// Rejects everything while recording the identifiers it was shown, in
/// order.
#[derive(Default)]
pub struct OrderRecorder {
    pub seen: Mutex<Vec<String>>,
}

#[async_trait]
impl PaymentProcessor for OrderRecorder {
    fn default_objective(&self) -> &'static str {
        "Record order"
    }

    async fn process_payments(
        &self,
        payments: Vec<Payment>,
    ) -> Result<Vec<ProcessPaymentResult>, ProcessorError> {
        let mut seen = self.seen.lock().unwrap();
        for payment in &payments {
            seen.push(payment.identifier.clone());
        }
        Ok(payments
            .iter()
            .map(|_| ProcessPaymentResult::reject())
            .collect())
    }

    async fn assign_payment(
        &self,
        _payment: Payment,
        _ctx: &AssignmentContext,
    ) -> Result<ProcessPaymentResult, AssignError> {
        Ok(ProcessPaymentResult::reject())
    }
}

/// Requires a tax date on manual assignment and accepts when one is given.
pub struct TaxDateProcessor;

#[async_trait]
impl PaymentProcessor for TaxDateProcessor {
    fn default_objective(&self) -> &'static str {
        "Tax dated objective"
    }

    fn manual_tax_date(&self) -> bool {
        true
    }

    async fn process_payments(
        &self,
        payments: Vec<Payment>,
    ) -> Result<Vec<ProcessPaymentResult>, ProcessorError> {
        Ok(payments
            .iter()
            .map(|_| ProcessPaymentResult::reject())
            .collect())
    }

    async fn assign_payment(
        &self,
        payment: Payment,
        ctx: &AssignmentContext,
    ) -> Result<ProcessPaymentResult, AssignError> {
        let Some(tax_date) = ctx.tax_date else {
            return Err(AssignError::InvalidTaxDate("tax date missing".into()));
        };
        if let Some(transaction_date) = payment.transaction_date
            && tax_date < transaction_date
        {
            return Err(AssignError::InvalidTaxDate(
                "tax date before the payment".into(),
            ));
        }
        Ok(ProcessPaymentResult::accept())
    }
}

/// Scripted gateway: maps payment identifiers to a canned sync response.
pub struct FakeGateway {
    name: String,
    responses: Mutex<HashMap<String, Result<(PaymentState, String), HandlerError>>>,
}

impl FakeGateway {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            responses: Mutex::new(HashMap::new()),
        }
    }

    pub fn respond(&self, identifier: &str, state: PaymentState, gateway_status: &str) {
        self.responses.lock().unwrap().insert(
            identifier.to_string(),
            Ok((state, gateway_status.to_string())),
        );
    }

    pub fn fail(&self, identifier: &str, error: HandlerError) {
        self.responses
            .lock()
            .unwrap()
            .insert(identifier.to_string(), Err(error));
    }
}

#[async_trait]
impl CardPaymentHandler for FakeGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init_payment(
        &self,
        _store: &dyn PaymentStore,
        _amount: Money,
        _variable_symbol: &str,
        _processor: &str,
        _return_url: &str,
        _cart: &[CartItem],
        _language: &str,
    ) -> Result<(Payment, String), HandlerError> {
        Err(HandlerError::Protocol("init not scripted".into()))
    }

    async fn sync_payment(&self, payment: &mut Payment) -> Result<(), HandlerError> {
        let response = self
            .responses
            .lock()
            .unwrap()
            .remove(&payment.identifier)
            .unwrap_or_else(|| Err(HandlerError::Protocol("no scripted response".into())));
        let (state, gateway_status) = response?;
        payment.apply_gateway_state(state, &gateway_status);
        Ok(())
    }
}
