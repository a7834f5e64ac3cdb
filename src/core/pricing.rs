use crate::domain::model::PlatformFeeRate;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{CommerceError, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// 金額相加，溢位時回報錯誤
pub fn checked_add(a: u64, b: u64, context: &str) -> Result<u64> {
    a.checked_add(b).ok_or_else(|| CommerceError::overflow(context))
}

/// 平台手續費計算
#[derive(Debug, Clone)]
pub struct FeeService {
    default_percentage: u32,
    minimum_fee_cents: u64,
    schedule: Vec<PlatformFeeRate>,
}

impl FeeService {
    pub fn new(default_percentage: u32, minimum_fee_cents: u64, schedule: Vec<PlatformFeeRate>) -> Self {
        Self {
            default_percentage,
            minimum_fee_cents,
            schedule,
        }
    }

    pub fn from_config(config: &dyn ConfigProvider) -> Self {
        Self::new(
            config.default_fee_percentage(),
            config.minimum_fee_cents(),
            config.fee_schedule().to_vec(),
        )
    }

    /// applies_from <= now 的設定中最新的一筆，沒有就用預設值
    pub fn active_rate(&self, now: DateTime<Utc>) -> u32 {
        self.schedule
            .iter()
            .filter(|rate| rate.applies_from <= now)
            .max_by_key(|rate| rate.applies_from)
            .map(|rate| rate.percentage)
            .unwrap_or(self.default_percentage)
    }

    pub fn calculate_platform_fee(&self, base_cents: u64) -> Result<u64> {
        self.calculate_platform_fee_at(base_cents, Utc::now())
    }

    pub fn calculate_platform_fee_at(&self, base_cents: u64, now: DateTime<Utc>) -> Result<u64> {
        // 純點數購物車不收手續費
        if base_cents == 0 {
            return Ok(0);
        }

        let fee = base_cents
            .checked_mul(u64::from(self.active_rate(now)))
            .ok_or_else(|| CommerceError::overflow("platform fee"))?
            / 100;

        Ok(fee.max(self.minimum_fee_cents))
    }
}

impl Default for FeeService {
    fn default() -> Self {
        Self::new(5, 100, Vec::new())
    }
}

/// 依國家計算銷售稅，稅率以 basis points 表示
#[derive(Debug, Clone)]
pub struct TaxService {
    rates: BTreeMap<String, u32>,
}

impl TaxService {
    pub fn new(rates: BTreeMap<String, u32>) -> Self {
        Self { rates }
    }

    pub fn from_config(config: &dyn ConfigProvider) -> Self {
        Self::new(config.tax_rates().clone())
    }

    pub fn get_tax_rate(&self, country_code: &str) -> Option<u32> {
        self.rates.get(country_code).copied()
    }

    pub fn calculate_tax(&self, base_cents: u64, country_code: &str) -> Result<u64> {
        let Some(bps) = self.get_tax_rate(country_code) else {
            tracing::debug!("No tax rate for country {}, tax is 0", country_code);
            return Ok(0);
        };

        Ok(base_cents
            .checked_mul(u64::from(bps))
            .ok_or_else(|| CommerceError::overflow("sales tax"))?
            / 10_000)
    }
}

impl Default for TaxService {
    fn default() -> Self {
        let rates = [("US", 0), ("GB", 2000), ("JP", 1000)]
            .into_iter()
            .map(|(code, bps)| (code.to_string(), bps))
            .collect();
        Self::new(rates)
    }
}
