use thiserror::Error;

/// Failure kinds surfaced to the invoking client.
///
/// Every variant is terminal for the invocation: no ledger mutation is kept
/// and nothing is retried internally. The `Display` output is the exact
/// message the client sees.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("{0} not found in the transient map input")]
    MissingInput(String),

    #[error("failed to unmarshal JSON: {0}")]
    MalformedInput(String),

    #[error("{0}")]
    InvalidField(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    ConsistencyFailure(String),

    #[error("{0}")]
    Platform(String),
}

impl TransferError {
    /// Stable name of the error kind, used by scenario files and the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::MissingInput(_) => "MissingInput",
            TransferError::MalformedInput(_) => "MalformedInput",
            TransferError::InvalidField(_) => "InvalidField",
            TransferError::Conflict(_) => "Conflict",
            TransferError::NotFound(_) => "NotFound",
            TransferError::Unauthorized(_) => "Unauthorized",
            TransferError::ConsistencyFailure(_) => "ConsistencyFailure",
            TransferError::Platform(_) => "PlatformError",
        }
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;

impl From<serde_json::Error> for TransferError {
    fn from(err: serde_json::Error) -> Self {
        TransferError::Platform(format!("failed to decode ledger record: {}", err))
    }
}

impl From<secp256k1::Error> for TransferError {
    fn from(err: secp256k1::Error) -> Self {
        TransferError::Platform(format!("cryptographic error: {}", err))
    }
}
