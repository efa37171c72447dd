use {
    crate::domain::error::{ConfigError, HandlerError, ValidationError},
    crate::domain::money::Money,
    crate::domain::payment::Payment,
    crate::domain::store::PaymentStore,
    async_trait::async_trait,
    std::collections::HashMap,
    std::str::FromStr,
    std::sync::Arc,
};

pub mod stripe;

pub use stripe::{StripeCardHandler, StripeSettings};

/// One line of the gateway cart shown to the customer.
#[derive(Debug, Clone)]
pub struct CartItem {
    pub name: String,
    pub quantity: u32,
    /// Line total, not unit price.
    pub amount: Money,
    pub description: String,
}

/// A cart has one or two items and their amounts must sum to the payment
/// total.
pub fn validate_cart(cart: &[CartItem], total: Money) -> Result<(), ValidationError> {
    if cart.is_empty() || cart.len() > 2 {
        return Err(ValidationError(format!(
            "cart must have one or two items, got {}",
            cart.len()
        )));
    }
    let mut sum = 0i64;
    for item in cart {
        if item.amount.currency() != total.currency() {
            return Err(ValidationError(format!(
                "cart item {} is in {}, payment is in {}",
                item.name,
                item.amount.currency(),
                total.currency()
            )));
        }
        sum += item.amount.minor();
    }
    if sum != total.minor() {
        return Err(ValidationError(format!(
            "cart total {sum} does not match payment amount {}",
            total.minor()
        )));
    }
    Ok(())
}

/// Encapsulates one external card-payment gateway: creates payment intents
/// and reads back their external status.
#[async_trait]
pub trait CardPaymentHandler: Send + Sync {
    /// Configured name, recorded on every payment the handler creates.
    fn name(&self) -> &str;

    /// Create a payment intent at the gateway and persist the matching
    /// CARD_PAYMENT row in INITIALIZED, with the gateway-issued payment id as
    /// its identifier. Returns the stored payment and the target the customer
    /// is redirected to.
    #[allow(clippy::too_many_arguments)]
    async fn init_payment(
        &self,
        store: &dyn PaymentStore,
        amount: Money,
        variable_symbol: &str,
        processor: &str,
        return_url: &str,
        cart: &[CartItem],
        language: &str,
    ) -> Result<(Payment, String), HandlerError>;

    /// Query the gateway for the payment's current external status and apply
    /// it via `Payment::apply_gateway_state`. Does not persist; the caller
    /// owns the row lock and the write.
    async fn sync_payment(&self, payment: &mut Payment) -> Result<(), HandlerError>;
}

/// Closed set of gateway integrations this build can instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Stripe,
}

impl FromStr for HandlerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(Self::Stripe),
            other => Err(ConfigError::UnknownHandler(other.to_string())),
        }
    }
}

/// Card handler registry keyed by configured name; built once at startup.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CardPaymentHandler>>,
}

impl HandlerRegistry {
    pub fn new(handlers: Vec<Arc<dyn CardPaymentHandler>>) -> Self {
        Self {
            handlers: handlers
                .into_iter()
                .map(|handler| (handler.name().to_string(), handler))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CardPaymentHandler>> {
        self.handlers.get(name)
    }
}

/// Instantiate the configured handlers. A handler kind whose settings are
/// absent is a startup failure, not a mid-run surprise.
pub fn build_handlers(
    entries: &[(String, HandlerKind)],
    stripe: Option<&StripeSettings>,
) -> Result<HandlerRegistry, ConfigError> {
    let mut handlers: Vec<Arc<dyn CardPaymentHandler>> = Vec::with_capacity(entries.len());
    for (name, kind) in entries {
        match kind {
            HandlerKind::Stripe => {
                let settings = stripe.ok_or(ConfigError::Missing("STRIPE_SECRET_KEY"))?;
                handlers.push(Arc::new(StripeCardHandler::new(name, settings.clone())));
            }
        }
    }
    Ok(HandlerRegistry::new(handlers))
}
