use {
    crate::domain::error::{ConfigError, ProcessorError},
    crate::domain::payment::{Payment, ProcessingError},
    async_trait::async_trait,
    chrono::NaiveDate,
    std::collections::HashMap,
    std::str::FromStr,
    std::sync::Arc,
    thiserror::Error,
};

pub mod ignore;

pub use ignore::IgnoreProcessor;

/// Per-payment verdict, aligned positionally with the processor's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessPaymentResult {
    pub accepted: bool,
    pub error: Option<ProcessingError>,
}

impl ProcessPaymentResult {
    pub fn accept() -> Self {
        Self {
            accepted: true,
            error: None,
        }
    }

    pub fn accept_with(error: ProcessingError) -> Self {
        Self {
            accepted: true,
            error: Some(error),
        }
    }

    pub fn reject() -> Self {
        Self {
            accepted: false,
            error: None,
        }
    }

    pub fn reject_with(error: ProcessingError) -> Self {
        Self {
            accepted: false,
            error: Some(error),
        }
    }
}

/// Operator-supplied input for a manual assignment.
#[derive(Debug, Clone, Default)]
pub struct AssignmentContext {
    pub client_id: String,
    pub tax_date: Option<NaiveDate>,
}

#[derive(Debug, Error)]
pub enum AssignError {
    /// The supplied tax date is unusable for this processor; distinct from a
    /// generic rejection so the operator gets a field-level message.
    #[error("invalid tax date: {0}")]
    InvalidTaxDate(String),

    #[error(transparent)]
    Processor(#[from] ProcessorError),
}

/// A unit of business logic that decides what a payment is for.
///
/// `process_payments` receives owned payment values; the caller keeps its own
/// copy of the working set, so a processor may mutate or drop its input
/// freely. The returned verdicts must align positionally with the input.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Human readable objective of payments this processor settles.
    fn default_objective(&self) -> &'static str;

    /// Whether manual assignment requires an explicit tax date.
    fn manual_tax_date(&self) -> bool {
        false
    }

    async fn process_payments(
        &self,
        payments: Vec<Payment>,
    ) -> Result<Vec<ProcessPaymentResult>, ProcessorError>;

    /// Forced assignment of one payment to this processor, with the client
    /// reference as a hint.
    async fn assign_payment(
        &self,
        payment: Payment,
        ctx: &AssignmentContext,
    ) -> Result<ProcessPaymentResult, AssignError>;
}

/// Closed set of processors this build can instantiate. Configuration names
/// one of these per entry; resolution happens once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorKind {
    Ignore,
}

impl ProcessorKind {
    pub fn build(self) -> Arc<dyn PaymentProcessor> {
        match self {
            Self::Ignore => Arc::new(IgnoreProcessor),
        }
    }
}

impl FromStr for ProcessorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(Self::Ignore),
            other => Err(ConfigError::UnknownProcessor(other.to_string())),
        }
    }
}

/// Ordered processor registry. Built once at startup from static
/// configuration and shared for the process lifetime; order is significant,
/// the first accepting processor wins.
#[derive(Clone)]
pub struct ProcessorRegistry {
    ordered: Vec<(String, Arc<dyn PaymentProcessor>)>,
    by_name: HashMap<String, Arc<dyn PaymentProcessor>>,
}

impl ProcessorRegistry {
    pub fn new(entries: Vec<(String, Arc<dyn PaymentProcessor>)>) -> Self {
        let by_name = entries
            .iter()
            .map(|(name, processor)| (name.clone(), processor.clone()))
            .collect();
        Self {
            ordered: entries,
            by_name,
        }
    }

    pub fn from_config(entries: &[(String, ProcessorKind)]) -> Self {
        Self::new(
            entries.iter()
                .map(|(name, kind)| (name.clone(), kind.build()))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn PaymentProcessor>> {
        self.by_name.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn PaymentProcessor>)> {
        self.ordered
            .iter()
            .map(|(name, processor)| (name.as_str(), processor))
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_resolution_is_closed() {
        assert_eq!("ignore".parse::<ProcessorKind>().ok(), Some(ProcessorKind::Ignore));
        assert!(matches!(
            "fees".parse::<ProcessorKind>(),
            Err(ConfigError::UnknownProcessor(name)) if name == "fees"
        ));
    }

    #[test]
    fn registry_preserves_order() {
        let registry = ProcessorRegistry::from_config(&[
            ("first".to_string(), ProcessorKind::Ignore),
            ("second".to_string(), ProcessorKind::Ignore),
        ]);
        let names: Vec<&str> = registry.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["first", "second"]);
        assert!(registry.get("second").is_some());
        assert!(registry.get("third").is_none());
    }
}
