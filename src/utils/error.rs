use crate::domain::sequence::SequenceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Transient I/O failure: {message}")]
    TransientIo { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Invalid sequence state for '{sequence}': {message}")]
    InvalidSequenceState { sequence: String, message: String },

    #[error("Vehicle mismatch in sequence '{sequence}': sequence bound to '{expected}', order intends '{got}'")]
    VehicleMismatch {
        sequence: String,
        expected: String,
        got: String,
    },

    #[error("Order type mismatch in sequence '{sequence}': sequence type '{expected}', order type '{got}'")]
    OrderTypeMismatch {
        sequence: String,
        expected: String,
        got: String,
    },

    #[error("Out-of-order completion in sequence '{sequence}': expected index {expected}, got {got}")]
    OutOfOrderCompletion {
        sequence: String,
        expected: usize,
        got: usize,
    },

    #[error("No eligible vehicle for order type '{order_type}'")]
    NoEligibleVehicle { order_type: String },

    #[error("API request failed: {0}")]
    Api(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field '{field}'")]
    MissingConfigError { field: String },
}

/// 錯誤類別，用於日誌與匯總
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transport,
    Validation,
    Sequence,
    Deferred,
    Storage,
    Configuration,
}

/// 錯誤嚴重程度，CLI 依此決定結束碼
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl BridgeError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientIo {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TransientIo { .. } | Self::Api(_) => ErrorCategory::Transport,
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::InvalidSequenceState { .. }
            | Self::VehicleMismatch { .. }
            | Self::OrderTypeMismatch { .. }
            | Self::OutOfOrderCompletion { .. } => ErrorCategory::Sequence,
            Self::NoEligibleVehicle { .. } => ErrorCategory::Deferred,
            Self::Io(_) | Self::Serialization(_) => ErrorCategory::Storage,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Deferred => ErrorSeverity::Low,
            ErrorCategory::Transport => ErrorSeverity::Medium,
            ErrorCategory::Validation | ErrorCategory::Sequence => ErrorSeverity::High,
            ErrorCategory::Storage | ErrorCategory::Configuration => ErrorSeverity::Critical,
        }
    }

    /// 可於下一個 tick 重試（不推進任何狀態）
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientIo { .. } | Self::NoEligibleVehicle { .. } => true,
            Self::Api(e) => !e.is_decode() && !e.is_builder(),
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Transport => "Check that the order source and the kernel are reachable; the order is retried on the next tick",
            ErrorCategory::Validation => "Fix the external order record; rejected orders are not retried automatically",
            ErrorCategory::Sequence => "Inspect the order sequence and the outcome feed for inconsistent data",
            ErrorCategory::Deferred => "Wait for a vehicle to become idle, utilized and sufficiently charged",
            ErrorCategory::Storage => "Check permissions and free space of the state directory",
            ErrorCategory::Configuration => "Check the configuration file and environment variables",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::TransientIo { message } => format!("Kernel or order source unavailable: {}", message),
            Self::Api(e) if e.is_timeout() => "Request timed out".to_string(),
            Self::Api(e) if e.is_connect() => "Could not connect to remote service".to_string(),
            Self::NoEligibleVehicle { order_type } => {
                format!("No vehicle currently available for '{}' orders", order_type)
            }
            Self::MissingConfigError { field } => format!("Missing configuration: {}", field),
            other => other.to_string(),
        }
    }
}

impl From<SequenceError> for BridgeError {
    fn from(err: SequenceError) -> Self {
        match err {
            SequenceError::InvalidState { sequence, message } => {
                Self::InvalidSequenceState { sequence, message }
            }
            SequenceError::VehicleMismatch {
                sequence,
                expected,
                got,
            } => Self::VehicleMismatch {
                sequence,
                expected,
                got,
            },
            SequenceError::OrderTypeMismatch {
                sequence,
                expected,
                got,
            } => Self::OrderTypeMismatch {
                sequence,
                expected,
                got,
            },
            SequenceError::OutOfOrderCompletion {
                sequence,
                expected,
                got,
            } => Self::OutOfOrderCompletion {
                sequence,
                expected,
                got,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(BridgeError::transient("kernel down").is_transient());
        assert!(BridgeError::NoEligibleVehicle {
            order_type: "ANY".to_string()
        }
        .is_transient());
        assert!(!BridgeError::validation("no destinations").is_transient());
    }

    #[test]
    fn test_sequence_error_conversion_keeps_details() {
        let err: BridgeError = SequenceError::OutOfOrderCompletion {
            sequence: "Seq-1".to_string(),
            expected: 1,
            got: 2,
        }
        .into();

        assert_eq!(err.category(), ErrorCategory::Sequence);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.to_string().contains("expected index 1, got 2"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(ErrorSeverity::Low < ErrorSeverity::Critical);
        let err = BridgeError::ConfigError {
            message: "bad".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }
}
