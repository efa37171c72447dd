use {
    super::account::Account,
    super::error::ValidationError,
    super::money::Money,
    chrono::{DateTime, NaiveDate, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Transfer,
    CardPayment,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::CardPayment => "card_payment",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentType {
    type Error = ValidationError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "transfer" => Ok(Self::Transfer),
            "card_payment" => Ok(Self::CardPayment),
            other => Err(ValidationError(format!("unknown payment type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    /// Created at the card gateway, not yet confirmed paid.
    Initialized,
    /// Cleared and awaiting classification by a processor.
    ReadyToProcess,
    /// Accepted by a processor; `processor` names it.
    Processed,
    /// No processor accepted it; re-attempted on the next run.
    Deferred,
    /// Gateway reported cancellation, reversal or rejection. Terminal.
    Canceled,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::ReadyToProcess => "ready_to_process",
            Self::Processed => "processed",
            Self::Deferred => "deferred",
            Self::Canceled => "canceled",
        }
    }

    /// Whether a scheduler run should pick the payment up.
    pub fn awaits_processing(&self) -> bool {
        matches!(self, Self::ReadyToProcess | Self::Deferred)
    }

    pub fn can_transition_to(&self, new: &PaymentState) -> bool {
        use PaymentState::*;
        matches!(
            (self, new),
            (Initialized, ReadyToProcess)
                | (Initialized, Canceled)
                | (ReadyToProcess, Processed)
                | (ReadyToProcess, Deferred)
                | (ReadyToProcess, Canceled)
                | (Deferred, Processed)
                | (Deferred, Deferred)
                | (Deferred, ReadyToProcess)
                | (Deferred, Canceled)
                | (Processed, Canceled)
        )
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentState {
    type Error = ValidationError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "initialized" => Ok(Self::Initialized),
            "ready_to_process" => Ok(Self::ReadyToProcess),
            "processed" => Ok(Self::Processed),
            "deferred" => Ok(Self::Deferred),
            "canceled" => Ok(Self::Canceled),
            other => Err(ValidationError(format!("unknown payment state: {other}"))),
        }
    }
}

/// Diagnostic code attached by a processor. On an accepted payment it is a
/// warning annotation; on a rejection it defers the payment with attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingError {
    Duplicity,
    InsufficientAmount,
    ExcessiveAmount,
    Overdue,
    ManuallyBroken,
    TooOld,
}

impl ProcessingError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicity => "duplicity",
            Self::InsufficientAmount => "insufficient_amount",
            Self::ExcessiveAmount => "excessive_amount",
            Self::Overdue => "overdue",
            Self::ManuallyBroken => "manually_broken",
            Self::TooOld => "too_old",
        }
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ProcessingError {
    type Error = ValidationError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "duplicity" => Ok(Self::Duplicity),
            "insufficient_amount" => Ok(Self::InsufficientAmount),
            "excessive_amount" => Ok(Self::ExcessiveAmount),
            "overdue" => Ok(Self::Overdue),
            "manually_broken" => Ok(Self::ManuallyBroken),
            "too_old" => Ok(Self::TooOld),
            other => Err(ValidationError(format!(
                "unknown processing error: {other}"
            ))),
        }
    }
}

/// One line of a bank statement as handed over by a parser or downloader.
/// Absent optional fields map to empty strings on import.
#[derive(Debug, Clone)]
pub struct StatementRecord {
    pub identifier: String,
    pub counter_account_number: Option<String>,
    pub counter_account_name: Option<String>,
    pub amount: Money,
    pub transaction_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub constant_symbol: Option<String>,
    pub variable_symbol: Option<String>,
    pub specific_symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// System-generated, globally unique, immutable.
    pub uuid: Uuid,
    /// External reference; unique only within the owning account.
    pub identifier: String,
    pub payment_type: PaymentType,
    pub account: Account,
    pub amount: Money,
    pub transaction_date: Option<NaiveDate>,
    pub create_time: DateTime<Utc>,
    pub counter_account_number: String,
    pub counter_account_name: String,
    pub description: String,
    pub constant_symbol: String,
    pub variable_symbol: String,
    pub specific_symbol: String,
    pub state: PaymentState,
    /// Raw status last reported by the card gateway.
    pub card_gateway_state: String,
    pub processing_error: Option<ProcessingError>,
    /// Name of the processor that settled or claimed the payment.
    pub processor: String,
    /// Name of the gateway integration; blank for transfers.
    pub card_handler: String,
}

fn value_or_blank(value: Option<String>) -> String {
    value.unwrap_or_default()
}

impl Payment {
    /// Build an unsaved transfer payment from one statement line.
    pub fn from_statement(account: Account, record: StatementRecord) -> Self {
        Self {
            uuid: Uuid::now_v7(),
            identifier: record.identifier,
            payment_type: PaymentType::Transfer,
            account,
            amount: record.amount,
            transaction_date: record.transaction_date,
            create_time: Utc::now(),
            counter_account_number: value_or_blank(record.counter_account_number),
            counter_account_name: value_or_blank(record.counter_account_name),
            description: value_or_blank(record.description),
            constant_symbol: value_or_blank(record.constant_symbol),
            variable_symbol: value_or_blank(record.variable_symbol),
            specific_symbol: value_or_blank(record.specific_symbol),
            state: PaymentState::ReadyToProcess,
            card_gateway_state: String::new(),
            processing_error: None,
            processor: String::new(),
            card_handler: String::new(),
        }
    }

    /// Build an unsaved card payment for a freshly created gateway intent.
    /// The processor is fixed here and never reassigned by the scheduler.
    #[allow(clippy::too_many_arguments)]
    pub fn new_card(
        account: Account,
        identifier: impl Into<String>,
        amount: Money,
        description: impl Into<String>,
        variable_symbol: impl Into<String>,
        processor: impl Into<String>,
        card_handler: impl Into<String>,
        card_gateway_state: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            uuid: Uuid::now_v7(),
            identifier: identifier.into(),
            payment_type: PaymentType::CardPayment,
            account,
            amount,
            transaction_date: Some(now.date_naive()),
            create_time: now,
            counter_account_number: String::new(),
            counter_account_name: String::new(),
            description: description.into(),
            constant_symbol: String::new(),
            variable_symbol: variable_symbol.into(),
            specific_symbol: String::new(),
            state: PaymentState::Initialized,
            card_gateway_state: card_gateway_state.into(),
            processing_error: None,
            processor: processor.into(),
            card_handler: card_handler.into(),
        }
    }

    /// Structural invariants enforced before persistence.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount.currency() != self.account.currency {
            return Err(ValidationError(format!(
                "payment {} is in different currency ({}) than account {} ({})",
                self.identifier,
                self.amount.currency(),
                self.account.account_number,
                self.account.currency,
            )));
        }
        match self.payment_type {
            PaymentType::Transfer if self.counter_account_number.is_empty() => {
                Err(ValidationError(format!(
                    "transfer payment {} has no counter account number",
                    self.identifier
                )))
            }
            PaymentType::CardPayment if !self.counter_account_number.is_empty() => {
                Err(ValidationError(format!(
                    "card payment {} must not have a counter account number",
                    self.identifier
                )))
            }
            _ => Ok(()),
        }
    }

    /// Record a status reported by the card gateway. The free-text gateway
    /// status is always updated; the state machine advances only while the
    /// payment is still INITIALIZED, so a payment settled or canceled in the
    /// meantime is never pulled back by a late gateway report.
    pub fn apply_gateway_state(&mut self, mapped: PaymentState, gateway_status: &str) {
        self.card_gateway_state = gateway_status.to_string();
        if self.state == PaymentState::Initialized {
            self.state = mapped;
        }
    }

    /// Settled; the processor attribution was fixed earlier (card payments).
    pub fn mark_processed(&mut self, error: Option<ProcessingError>) {
        self.state = PaymentState::Processed;
        self.processing_error = error;
    }

    pub fn mark_processed_by(&mut self, processor: &str, error: Option<ProcessingError>) {
        self.processor = processor.to_string();
        self.mark_processed(error);
    }

    /// Deferred with a diagnostic; processor attribution untouched.
    pub fn mark_deferred(&mut self, error: Option<ProcessingError>) {
        self.state = PaymentState::Deferred;
        self.processing_error = error;
    }

    pub fn mark_deferred_by(&mut self, processor: &str, error: Option<ProcessingError>) {
        self.processor = processor.to_string();
        self.mark_deferred(error);
    }

    /// No processor claimed the payment; any earlier attribution and
    /// diagnostic stay as they were.
    pub fn mark_unclaimed(&mut self) {
        self.state = PaymentState::Deferred;
    }
}
