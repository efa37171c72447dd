use {
    super::{CardPaymentHandler, CartItem, validate_cart},
    crate::domain::account::AccountNumber,
    crate::domain::error::{HandlerError, ValidationError},
    crate::domain::money::{Currency, Money},
    crate::domain::payment::{Payment, PaymentState},
    crate::domain::store::{InsertOutcome, PaymentStore},
    async_trait::async_trait,
    std::time::Duration,
};

/// Connection settings for the Stripe-backed handler.
#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    /// Account that gateway payments are booked against.
    pub account_number: AccountNumber,
    /// Hosted payment page the customer is redirected to.
    pub payment_page_url: String,
    /// Applied to every gateway call; elapsing counts as a connection
    /// failure.
    pub timeout: Duration,
}

pub struct StripeCardHandler {
    name: String,
    client: stripe::Client,
    settings: StripeSettings,
}

impl StripeCardHandler {
    pub fn new(name: impl Into<String>, settings: StripeSettings) -> Self {
        Self {
            name: name.into(),
            client: stripe::Client::new(settings.secret_key.clone()),
            settings,
        }
    }
}

fn gateway_error(err: stripe::StripeError) -> HandlerError {
    match err {
        stripe::StripeError::Timeout => HandlerError::Connection("request timed out".into()),
        stripe::StripeError::ClientError(msg) => HandlerError::Connection(msg),
        other => HandlerError::Protocol(other.to_string()),
    }
}

fn map_intent_status(status: stripe::PaymentIntentStatus) -> PaymentState {
    use stripe::PaymentIntentStatus::*;
    #[allow(unreachable_patterns)]
    match status {
        Succeeded => PaymentState::ReadyToProcess,
        Canceled => PaymentState::Canceled,
        Processing | RequiresAction | RequiresCapture | RequiresConfirmation
        | RequiresPaymentMethod => PaymentState::Initialized,
        other => {
            tracing::warn!(status = ?other, "unknown gateway payment status, keeping initialized");
            PaymentState::Initialized
        }
    }
}

fn stripe_currency(currency: Currency) -> stripe::Currency {
    match currency {
        Currency::Czk => stripe::Currency::CZK,
        Currency::Eur => stripe::Currency::EUR,
        Currency::Usd => stripe::Currency::USD,
        Currency::Gbp => stripe::Currency::GBP,
    }
}

#[async_trait]
impl CardPaymentHandler for StripeCardHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init_payment(
        &self,
        store: &dyn PaymentStore,
        amount: Money,
        variable_symbol: &str,
        processor: &str,
        return_url: &str,
        cart: &[CartItem],
        language: &str,
    ) -> Result<(Payment, String), HandlerError> {
        validate_cart(cart, amount)?;
        if amount.minor() <= 0 {
            return Err(ValidationError(format!(
                "card payment amount must be positive, got {amount}"
            ))
            .into());
        }
        let account = store
            .account_by_number(&self.settings.account_number)
            .await?
            .ok_or_else(|| {
                HandlerError::Protocol(format!(
                    "gateway account {} is not in the store",
                    self.settings.account_number
                ))
            })?;

        let description = cart[0].name.clone();
        let mut metadata = stripe::Metadata::new();
        metadata.insert("variable_symbol".to_string(), variable_symbol.to_string());
        metadata.insert("processor".to_string(), processor.to_string());
        metadata.insert("return_url".to_string(), return_url.to_string());
        metadata.insert("language".to_string(), language.to_string());

        let mut params =
            stripe::CreatePaymentIntent::new(amount.minor(), stripe_currency(amount.currency()));
        params.description = Some(&description);
        params.metadata = Some(metadata);

        let intent = tokio::time::timeout(
            self.settings.timeout,
            stripe::PaymentIntent::create(&self.client, params),
        )
        .await
        .map_err(|_| HandlerError::Connection("gateway call timed out".into()))?
        .map_err(gateway_error)?;

        let client_secret = intent.client_secret.as_deref().ok_or_else(|| {
            HandlerError::Protocol("payment intent carries no client secret".into())
        })?;
        let redirect_url = format!(
            "{}?payment_intent_client_secret={client_secret}",
            self.settings.payment_page_url
        );

        let payment = Payment::new_card(
            account,
            intent.id.to_string(),
            amount,
            &description,
            variable_symbol,
            processor,
            &self.name,
            intent.status.as_str(),
        );
        payment.validate().map_err(HandlerError::Validation)?;
        match store.insert_payment(&payment).await? {
            InsertOutcome::Inserted => Ok((payment, redirect_url)),
            InsertOutcome::Duplicate => Err(HandlerError::Protocol(format!(
                "gateway issued an already known payment id {}",
                payment.identifier
            ))),
        }
    }

    async fn sync_payment(&self, payment: &mut Payment) -> Result<(), HandlerError> {
        let id = payment
            .identifier
            .parse::<stripe::PaymentIntentId>()
            .map_err(|e| {
                HandlerError::Protocol(format!(
                    "invalid payment intent id {}: {e}",
                    payment.identifier
                ))
            })?;
        let intent = tokio::time::timeout(
            self.settings.timeout,
            stripe::PaymentIntent::retrieve(&self.client, &id, &[]),
        )
        .await
        .map_err(|_| HandlerError::Connection("gateway call timed out".into()))?
        .map_err(gateway_error)?;

        payment.apply_gateway_state(map_intent_status(intent.status), intent.status.as_str());
        Ok(())
    }
}
