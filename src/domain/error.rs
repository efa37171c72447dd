use thiserror::Error;

/// Bad data on one record or payment. Recoverable: the offending unit is
/// skipped, the surrounding batch continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Failure talking to an external card gateway. The connection/protocol
/// split decides retry behavior: connection failures are retried on the next
/// scheduled run, protocol failures are logged and left alone.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("gateway connection: {0}")]
    Connection(String),

    #[error("gateway protocol: {0}")]
    Protocol(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The processor itself is broken; it is skipped for the run and the
/// remaining processors still get their chance.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ProcessorError(pub String);

/// Startup configuration problems. Always fatal, never silently ignored.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing setting {0}")]
    Missing(&'static str),

    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("unknown payment processor {0:?}")]
    UnknownProcessor(String),

    #[error("unknown card payment handler {0:?}")]
    UnknownHandler(String),

    #[error("unknown import callback {0:?}")]
    UnknownCallback(String),
}

/// Manual assignment failures surface to the operator as a field-level
/// message, never as a raw error dump.
#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error("unable to assign payment")]
    Rejected,

    #[error("unable to assign payment: {0}")]
    Failed(String),

    #[error("invalid tax date: {0}")]
    InvalidTaxDate(String),

    #[error("payment in state {0} cannot be assigned")]
    NotAssignable(String),

    #[error("unknown processor {0:?}")]
    UnknownProcessor(String),

    #[error("payment {0} does not exist")]
    NotFound(uuid::Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("following accounts do not exist: {}", .0.join(", "))]
    UnknownAccounts(Vec<String>),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}
