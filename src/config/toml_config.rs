use crate::domain::model::PlatformFeeRate;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{CommerceError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommerceConfig {
    pub platform: PlatformConfig,
    pub fees: FeeConfig,
    pub tax: TaxConfig,
    pub wallet: WalletConfig,
    pub points: PointsConfig,
    pub event_bus: EventBusConfig,
    pub payment: PaymentConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub name: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            name: "bounty-hub".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    pub default_percentage: u32,
    pub minimum_fee_cents: u64,
    pub schedule: Vec<PlatformFeeRate>,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            default_percentage: 5,
            minimum_fee_cents: 100,
            schedule: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxConfig {
    /// country code -> basis points (2000 = 20%)
    pub rates: BTreeMap<String, u32>,
}

impl Default for TaxConfig {
    fn default() -> Self {
        let rates = [("US", 0), ("GB", 2000), ("JP", 1000)]
            .into_iter()
            .map(|(code, bps)| (code.to_string(), bps))
            .collect();
        Self { rates }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub min_withdrawal_cents: u64,
    pub max_withdrawal_cents: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            min_withdrawal_cents: 1_000,
            max_withdrawal_cents: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PointsConfig {
    pub price_per_point_cents: u64,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            price_per_point_cents: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventBusMode {
    #[default]
    Sync,
    Async,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    pub mode: EventBusMode,
    pub logging_enabled: bool,
    /// 事件日誌最多保留的筆數，超過時捨棄最舊的紀錄
    pub log_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            mode: EventBusMode::Sync,
            logging_enabled: true,
            log_capacity: crate::core::event_bus::DEFAULT_EVENT_LOG_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    #[default]
    Simulated,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    pub gateway: GatewayKind,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayKind::Simulated,
            endpoint: None,
            api_key: None,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
        }
    }
}

impl CommerceConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(CommerceError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| CommerceError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${PAYMENT_API_KEY})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| CommerceError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("platform.name", &self.platform.name)?;

        // 手續費
        validation::validate_range("fees.default_percentage", self.fees.default_percentage, 1, 100)?;
        for rate in &self.fees.schedule {
            validation::validate_range("fees.schedule.percentage", rate.percentage, 1, 100)?;
        }

        // 稅率
        for (country, bps) in &self.tax.rates {
            validation::validate_country_code("tax.rates", country)?;
            validation::validate_range("tax.rates", *bps, 0, 10_000)?;
        }

        // 提領上下限
        if self.wallet.min_withdrawal_cents > self.wallet.max_withdrawal_cents {
            return Err(CommerceError::InvalidConfigValueError {
                field: "wallet.min_withdrawal_cents".to_string(),
                value: self.wallet.min_withdrawal_cents.to_string(),
                reason: format!(
                    "Must not exceed wallet.max_withdrawal_cents ({})",
                    self.wallet.max_withdrawal_cents
                ),
            });
        }

        if self.points.price_per_point_cents == 0 {
            return Err(CommerceError::InvalidConfigValueError {
                field: "points.price_per_point_cents".to_string(),
                value: "0".to_string(),
                reason: "Point price must be positive".to_string(),
            });
        }

        // HTTP 付款閘道必須有 endpoint
        if self.payment.gateway == GatewayKind::Http {
            let endpoint = validation::validate_required_field("payment.endpoint", &self.payment.endpoint)?;
            validation::validate_url("payment.endpoint", endpoint)?;
        }
        validation::validate_range("payment.timeout_seconds", self.payment.timeout_seconds, 1, 300)?;

        validation::validate_path("storage.data_dir", &self.storage.data_dir)?;
        validation::validate_range("event_bus.log_capacity", self.event_bus.log_capacity, 1, 1_000_000)?;

        Ok(())
    }

    /// 是否使用非同步事件分派
    pub fn async_events(&self) -> bool {
        self.event_bus.mode == EventBusMode::Async
    }
}

impl ConfigProvider for CommerceConfig {
    fn default_fee_percentage(&self) -> u32 {
        self.fees.default_percentage
    }

    fn minimum_fee_cents(&self) -> u64 {
        self.fees.minimum_fee_cents
    }

    fn fee_schedule(&self) -> &[PlatformFeeRate] {
        &self.fees.schedule
    }

    fn tax_rates(&self) -> &BTreeMap<String, u32> {
        &self.tax.rates
    }

    fn min_withdrawal_cents(&self) -> u64 {
        self.wallet.min_withdrawal_cents
    }

    fn max_withdrawal_cents(&self) -> u64 {
        self.wallet.max_withdrawal_cents
    }

    fn point_price_cents(&self) -> u64 {
        self.points.price_per_point_cents
    }
}

impl Validate for CommerceConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_without_any_section() {
        let config = CommerceConfig::from_toml_str("").unwrap();

        assert_eq!(config.fees.default_percentage, 5);
        assert_eq!(config.fees.minimum_fee_cents, 100);
        assert_eq!(config.tax.rates.get("GB"), Some(&2000));
        assert_eq!(config.wallet.min_withdrawal_cents, 1_000);
        assert_eq!(config.event_bus.mode, EventBusMode::Sync);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[platform]
name = "test-platform"

[fees]
default_percentage = 8
minimum_fee_cents = 50

[[fees.schedule]]
percentage = 10
applies_from = "2024-01-01T00:00:00Z"

[tax.rates]
US = 0
DE = 1900

[event_bus]
mode = "async"

[payment]
gateway = "http"
endpoint = "https://payments.example.com/api"
timeout_seconds = 5
"#;

        let config = CommerceConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.platform.name, "test-platform");
        assert_eq!(config.fees.schedule.len(), 1);
        assert_eq!(config.fees.schedule[0].percentage, 10);
        assert_eq!(config.tax.rates.get("DE"), Some(&1900));
        // 只覆寫了 tax.rates，GB 不再存在
        assert!(config.tax.rates.get("GB").is_none());
        assert!(config.async_events());
        assert_eq!(config.payment.gateway, GatewayKind::Http);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("TEST_COMMERCE_ENDPOINT", "https://pay.test.com");

        let toml_content = r#"
[payment]
gateway = "http"
endpoint = "${TEST_COMMERCE_ENDPOINT}"
"#;

        let config = CommerceConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.payment.endpoint.as_deref(), Some("https://pay.test.com"));

        std::env::remove_var("TEST_COMMERCE_ENDPOINT");
    }

    #[test]
    fn test_config_validation() {
        let http_without_endpoint = CommerceConfig::from_toml_str("[payment]\ngateway = \"http\"\n").unwrap();
        assert!(http_without_endpoint.validate().is_err());

        let bad_fee = CommerceConfig::from_toml_str("[fees]\ndefault_percentage = 0\n").unwrap();
        assert!(bad_fee.validate().is_err());

        let bad_country = CommerceConfig::from_toml_str("[tax.rates]\nusa = 100\n").unwrap();
        assert!(bad_country.validate().is_err());

        let inverted_limits = CommerceConfig::from_toml_str(
            "[wallet]\nmin_withdrawal_cents = 5000\nmax_withdrawal_cents = 100\n",
        )
        .unwrap();
        assert!(inverted_limits.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[platform]\nname = \"file-test\"\n\n[storage]\ndata_dir = \"/tmp/commerce\"\n")
            .unwrap();

        let config = CommerceConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.platform.name, "file-test");
        assert_eq!(config.storage.data_dir, "/tmp/commerce");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = CommerceConfig::from_toml_str("[fees\n").unwrap_err();
        assert!(matches!(err, CommerceError::ConfigError { .. }));
    }
}
