use {
    super::{AssignError, AssignmentContext, PaymentProcessor, ProcessPaymentResult},
    crate::domain::error::ProcessorError,
    crate::domain::payment::Payment,
    async_trait::async_trait,
};

/// Rejects every payment during automatic processing and accepts any payment
/// on manual assignment. Used to write off payments that are nobody's
/// business, such as bank fees.
pub struct IgnoreProcessor;

#[async_trait]
impl PaymentProcessor for IgnoreProcessor {
    fn default_objective(&self) -> &'static str {
        "Ignore payment"
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
        Ok(ProcessPaymentResult::accept())
    }
}
