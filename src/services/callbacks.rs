use {
    super::import::{CallbackDecision, ImportCallback},
    crate::domain::error::{ConfigError, ValidationError},
    crate::domain::payment::{Payment, PaymentState},
};

/// Stamp negative payments as settled by the configured ignore processor, so
/// outgoing statement lines never enter the processor chain.
pub struct IgnoreNegativePayments {
    processor: String,
}

impl IgnoreNegativePayments {
    pub fn new(processor: impl Into<String>) -> Self {
        Self {
            processor: processor.into(),
        }
    }
}

impl ImportCallback for IgnoreNegativePayments {
    fn name(&self) -> &str {
        "ignore_negative_payments"
    }

    fn apply(&self, payment: &mut Payment) -> Result<CallbackDecision, ValidationError> {
        if payment.amount.is_negative() {
            payment.state = PaymentState::Processed;
            payment.processor = self.processor.clone();
        }
        Ok(CallbackDecision::Keep)
    }
}

/// Reject credit card transaction summary lines: an empty counter account
/// combined with constant symbol 1176 or 1178.
pub struct SkipCardTransactionSummary;

impl ImportCallback for SkipCardTransactionSummary {
    fn name(&self) -> &str {
        "skip_card_transaction_summary"
    }

    fn apply(&self, payment: &mut Payment) -> Result<CallbackDecision, ValidationError> {
        if payment.counter_account_number.is_empty()
            && matches!(payment.constant_symbol.as_str(), "1176" | "1178")
        {
            return Err(ValidationError(
                "payment is a credit card transaction summary".to_string(),
            ));
        }
        Ok(CallbackDecision::Keep)
    }
}

/// Instantiate the configured import callbacks in order. The negative
/// payment callback needs an ignore processor in the chain; its absence is a
/// startup failure.
pub fn build_callbacks(
    names: &[String],
    ignore_processor: Option<&str>,
) -> Result<Vec<Box<dyn ImportCallback>>, ConfigError> {
    let mut callbacks: Vec<Box<dyn ImportCallback>> = Vec::with_capacity(names.len());
    for name in names {
        match name.as_str() {
            "ignore_negative_payments" => {
                let processor = ignore_processor.ok_or(ConfigError::Invalid {
                    name: "IMPORT_CALLBACKS",
                    reason: "ignore_negative_payments requires an ignore processor \
                             in PAYMENT_PROCESSORS"
                        .to_string(),
                })?;
                callbacks.push(Box::new(IgnoreNegativePayments::new(processor)));
            }
            "skip_card_transaction_summary" => {
                callbacks.push(Box::new(SkipCardTransactionSummary));
            }
            other => return Err(ConfigError::UnknownCallback(other.to_string())),
        }
    }
    Ok(callbacks)
}
