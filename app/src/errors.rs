use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletError {
    // Wallet provider errors
    ProviderUnavailable(String),
    ProviderError(String),
    SignatureError(String),
    SignerMismatch(String),

    // Connection flow errors
    ConnectionInProgress,
    ConnectionAbandoned,

    // Storage errors
    StorageError(String),
    FileNotFound(String),
    PermissionDenied(String),

    // Validation errors
    ValidationError(String),
    InvalidAddress(String),

    // Application errors
    NotFound(String),

    // Generic errors
    Unknown(String),
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WalletError::ProviderUnavailable(msg) => write!(f, "Wallet unavailable: {}", msg),
            WalletError::ProviderError(msg) => write!(f, "Wallet provider error: {}", msg),
            WalletError::SignatureError(msg) => write!(f, "Signature error: {}", msg),
            WalletError::SignerMismatch(msg) => write!(f, "Signer mismatch: {}", msg),

            WalletError::ConnectionInProgress => {
                write!(f, "A wallet connection attempt is already in progress")
            }
            WalletError::ConnectionAbandoned => {
                write!(f, "Wallet connection attempt was abandoned")
            }

            WalletError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            WalletError::FileNotFound(msg) => write!(f, "File not found: {}", msg),
            WalletError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),

            WalletError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            WalletError::InvalidAddress(msg) => write!(f, "Invalid address: {}", msg),

            WalletError::NotFound(msg) => write!(f, "Not found: {}", msg),

            WalletError::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl std::error::Error for WalletError {}

impl WalletError {
    /// Prefix the message with `context`, keeping the variant.
    pub fn with_context(self, context: &str) -> Self {
        let prefix = |msg: String| format!("{}: {}", context, msg);
        match self {
            WalletError::ProviderUnavailable(msg) => WalletError::ProviderUnavailable(prefix(msg)),
            WalletError::ProviderError(msg) => WalletError::ProviderError(prefix(msg)),
            WalletError::SignatureError(msg) => WalletError::SignatureError(prefix(msg)),
            WalletError::SignerMismatch(msg) => WalletError::SignerMismatch(prefix(msg)),
            WalletError::StorageError(msg) => WalletError::StorageError(prefix(msg)),
            WalletError::FileNotFound(msg) => WalletError::FileNotFound(prefix(msg)),
            WalletError::PermissionDenied(msg) => WalletError::PermissionDenied(prefix(msg)),
            WalletError::ValidationError(msg) => WalletError::ValidationError(prefix(msg)),
            WalletError::InvalidAddress(msg) => WalletError::InvalidAddress(prefix(msg)),
            WalletError::NotFound(msg) => WalletError::NotFound(prefix(msg)),
            WalletError::Unknown(msg) => WalletError::Unknown(prefix(msg)),
            other @ (WalletError::ConnectionInProgress | WalletError::ConnectionAbandoned) => {
                other
            }
        }
    }
}

pub type WalletResult<T> = Result<T, WalletError>;

// Helper macro for easy error creation
#[macro_export]
macro_rules! wallet_error {
    ($variant:ident, $msg:expr) => {
        $crate::errors::WalletError::$variant($msg.to_string())
    };
    ($variant:ident) => {
        $crate::errors::WalletError::$variant
    };
}

// Conversion helpers
impl From<std::io::Error> for WalletError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => WalletError::FileNotFound(error.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                WalletError::PermissionDenied(error.to_string())
            }
            _ => WalletError::StorageError(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(error: serde_json::Error) -> Self {
        WalletError::ValidationError(format!("JSON error: {}", error))
    }
}
