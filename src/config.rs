use {
    crate::domain::account::AccountNumber,
    crate::domain::error::ConfigError,
    crate::handlers::{HandlerKind, StripeSettings},
    crate::processors::ProcessorKind,
    std::env,
    std::str::FromStr,
    std::time::Duration,
};

/// Advisory lock key guarding the processing run against overlap.
const DEFAULT_RUN_LOCK_KEY: i64 = 824_223_001;

const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 30;

/// Process-wide configuration, read from the environment once at startup.
/// Unknown processor, handler or callback names fail here, never mid-run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Ordered (name, kind) pairs driving the processor chain.
    pub processors: Vec<(String, ProcessorKind)>,
    pub card_handlers: Vec<(String, HandlerKind)>,
    pub import_callbacks: Vec<String>,
    pub run_lock_key: i64,
    pub stripe: Option<StripeSettings>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = require("DATABASE_URL")?;

        let processors =
            parse_named_list::<ProcessorKind>(&require("PAYMENT_PROCESSORS")?)?;
        if processors.is_empty() {
            return Err(ConfigError::Invalid {
                name: "PAYMENT_PROCESSORS",
                reason: "at least one processor must be configured".to_string(),
            });
        }

        let card_handlers = match optional("CARD_PAYMENT_HANDLERS") {
            Some(value) => parse_named_list::<HandlerKind>(&value)?,
            None => Vec::new(),
        };

        let import_callbacks = optional("IMPORT_CALLBACKS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let run_lock_key = match optional("PROCESS_PAYMENTS_LOCK_KEY") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "PROCESS_PAYMENTS_LOCK_KEY",
                reason: format!("not an integer: {value}"),
            })?,
            None => DEFAULT_RUN_LOCK_KEY,
        };

        let stripe = stripe_from_env()?;
        if card_handlers.iter().any(|(_, kind)| *kind == HandlerKind::Stripe)
            && stripe.is_none()
        {
            return Err(ConfigError::Missing("STRIPE_SECRET_KEY"));
        }

        Ok(Self {
            database_url,
            processors,
            card_handlers,
            import_callbacks,
            run_lock_key,
            stripe,
        })
    }

    /// Name of the configured ignore processor, if any.
    pub fn ignore_processor(&self) -> Option<&str> {
        self.processors
            .iter()
            .find(|(_, kind)| *kind == ProcessorKind::Ignore)
            .map(|(name, _)| name.as_str())
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

/// Parse a comma separated list of `name:kind` entries; a bare `kind` names
/// the entry after itself.
fn parse_named_list<K>(value: &str) -> Result<Vec<(String, K)>, ConfigError>
where
    K: FromStr<Err = ConfigError>,
{
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (name, kind) = match item.split_once(':') {
                Some((name, kind)) => (name.trim(), kind.trim()),
                None => (item, item),
            };
            Ok((name.to_string(), kind.parse()?))
        })
        .collect()
}

fn stripe_from_env() -> Result<Option<StripeSettings>, ConfigError> {
    let Some(secret_key) = optional("STRIPE_SECRET_KEY") else {
        return Ok(None);
    };
    let account_number = require("STRIPE_ACCOUNT_NUMBER")?;
    let payment_page_url = require("STRIPE_PAYMENT_PAGE_URL")?;
    let timeout = match optional("GATEWAY_TIMEOUT_SECS") {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name: "GATEWAY_TIMEOUT_SECS",
            reason: format!("not an integer: {value}"),
        })?,
        None => DEFAULT_GATEWAY_TIMEOUT_SECS,
    };
    Ok(Some(StripeSettings {
        secret_key,
        account_number: AccountNumber::new(account_number),
        payment_page_url,
        timeout: Duration::from_secs(timeout),
    }))
}
