use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommerceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Payment provider request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} {id} is {actual}, expected {expected}")]
    InvalidState {
        entity: &'static str,
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Validation failed: {}", errors.join("; "))]
    ValidationErrors { errors: Vec<String> },

    #[error("Insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("Insufficient points: needed {needed} points, available {available} points")]
    InsufficientPoints { needed: u64, available: u64 },

    #[error("Payment via {method} failed: {message}")]
    PaymentError { method: String, message: String },

    #[error("Unsupported payment method: {method}")]
    UnsupportedPaymentMethod { method: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field} ('{value}'): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Persistence error: {message}")]
    PersistenceError { message: String },

    #[error("Event '{event}' failed in {} listener(s): {}", failures.len(), failures.join("; "))]
    EventDispatchError { event: String, failures: Vec<String> },

    #[error("Amount overflow while computing {context}")]
    AmountOverflow { context: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Validation,
    State,
    Payment,
    Storage,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CommerceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(
        entity: &'static str,
        id: impl ToString,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::InvalidState {
            entity,
            id: id.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn overflow(context: impl Into<String>) -> Self {
        Self::AmountOverflow {
            context: context.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::ValidationError { .. }
            | Self::ValidationErrors { .. }
            | Self::NotFound { .. } => ErrorCategory::Validation,
            Self::InvalidState { .. }
            | Self::InsufficientFunds { .. }
            | Self::InsufficientPoints { .. } => ErrorCategory::State,
            Self::PaymentError { .. }
            | Self::UnsupportedPaymentMethod { .. }
            | Self::HttpError(_) => ErrorCategory::Payment,
            Self::IoError(_) | Self::SerializationError(_) | Self::PersistenceError { .. } => {
                ErrorCategory::Storage
            }
            Self::EventDispatchError { .. } | Self::AmountOverflow { .. } => {
                ErrorCategory::Internal
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Validation => ErrorSeverity::Low,
            ErrorCategory::State | ErrorCategory::Payment => ErrorSeverity::Medium,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Storage | ErrorCategory::Internal => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "檢查 ID 是否正確，或先建立對應的資料",
            Self::InvalidState { .. } => "確認目前狀態後再重試此操作",
            Self::ValidationError { .. } | Self::ValidationErrors { .. } => {
                "修正輸入資料後再重試"
            }
            Self::InsufficientFunds { .. } => "請先儲值錢包，或指定外部付款方式",
            Self::InsufficientPoints { .. } => "請先取得足夠的點數，或移除點數 bounty",
            Self::PaymentError { .. } | Self::HttpError(_) => {
                "稍後重試，或改用其他付款方式"
            }
            Self::UnsupportedPaymentMethod { .. } => "請使用 PayPal、USDT 或 CreditCard",
            Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => "檢查 TOML 配置檔的格式與欄位",
            Self::IoError(_) | Self::SerializationError(_) | Self::PersistenceError { .. } => {
                "檢查資料目錄的權限與磁碟空間"
            }
            Self::EventDispatchError { .. } => "查看日誌中失敗的 listener 並重新處理訂單",
            Self::AmountOverflow { .. } => "金額超出範圍，請拆分訂單",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::NotFound { entity, id } => format!("找不到 {} ({})", entity, id),
            Self::InsufficientFunds { needed, available } => format!(
                "餘額不足: 需要 ${:.2}，目前只有 ${:.2}",
                *needed as f64 / 100.0,
                *available as f64 / 100.0
            ),
            Self::InsufficientPoints { needed, available } => {
                format!("點數不足: 需要 {} 點，目前只有 {} 點", needed, available)
            }
            Self::ValidationErrors { errors } => {
                format!("資料驗證失敗: {}", errors.join(", "))
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CommerceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_and_severity() {
        let err = CommerceError::not_found("Cart", "abc");
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(err.severity(), ErrorSeverity::Low);

        let err = CommerceError::InsufficientFunds {
            needed: 500,
            available: 100,
        };
        assert_eq!(err.category(), ErrorCategory::State);
        assert!(err.user_friendly_message().contains("$5.00"));

        let err = CommerceError::InsufficientPoints {
            needed: 500,
            available: 0,
        };
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(err.to_string().contains("500 points"));

        let err = CommerceError::PersistenceError {
            message: "disk full".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_validation_errors_display() {
        let err = CommerceError::ValidationErrors {
            errors: vec!["Cart is not open".to_string(), "Cart has no items".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Validation failed: Cart is not open; Cart has no items"
        );
    }
}
