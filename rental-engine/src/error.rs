//! Error types for the rental engine

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
///
/// Every variant maps to a stable machine code via [`Error::code`].
#[derive(Error, Debug)]
pub enum Error {
    /// Entity absent
    #[error("{0}")]
    NotFound(String),

    /// Actor not authorized for the action
    #[error("{0}")]
    Forbidden(String),

    /// Malformed input
    #[error("{0}")]
    InvalidArgument(String),

    /// State-machine violation
    #[error("{0}")]
    InvalidTransition(String),

    /// Duplicate policy or dispute
    #[error("{0}")]
    Conflict(String),

    /// Payment provider or collaborator call failed
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Webhook authentication failure
    #[error("Invalid webhook signature: {0}")]
    SignatureInvalid(String),

    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[source] rental_ledger::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::InvalidTransition(_) => "INVALID_TRANSITION",
            Error::Conflict(_) => "CONFLICT",
            Error::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Error::SignatureInvalid(_) => "SIGNATURE_INVALID",
            Error::Ledger(_) | Error::Config(_) | Error::Io(_) => "INTERNAL",
        }
    }

    /// Wrap a failed collaborator lookup
    pub fn collaborator(service: &str, err: anyhow::Error) -> Self {
        Error::ExternalService(format!("{}: {:#}", service, err))
    }
}

impl From<rental_ledger::Error> for Error {
    fn from(err: rental_ledger::Error) -> Self {
        match err {
            rental_ledger::Error::NotFound { entity, .. } => {
                Error::NotFound(format!("{} not found", entity))
            }
            rental_ledger::Error::Conflict(msg) => Error::Conflict(msg),
            other => Error::Ledger(other),
        }
    }
}

impl From<payment_adapters::Error> for Error {
    fn from(err: payment_adapters::Error) -> Self {
        match err {
            payment_adapters::Error::SignatureInvalid(msg) => Error::SignatureInvalid(msg),
            payment_adapters::Error::MalformedEvent(msg) => Error::InvalidArgument(msg),
            payment_adapters::Error::Config(msg) => Error::Config(msg),
            other => Error::ExternalService(other.to_string()),
        }
    }
}
