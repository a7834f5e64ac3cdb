use crate::domain::events::CommerceEvent;
use crate::domain::model::{CommerceState, PaymentMethod, PlatformFeeRate};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// 付款方式所需的欄位，例如 paypal_email、usdt_address
pub type PaymentDetails = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub transaction_id: String,
    pub amount_cents: u64,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

/// 交易式的資料存取。atomic 在草稿上執行，回傳 Ok 才提交；同一時間只有一個 atomic 在執行。
pub trait Store: Send + Sync {
    fn read<T, F>(&self, f: F) -> impl std::future::Future<Output = Result<T>> + Send
    where
        F: FnOnce(&CommerceState) -> Result<T> + Send,
        T: Send;

    fn atomic<T, F>(&self, f: F) -> impl std::future::Future<Output = Result<T>> + Send
    where
        F: FnOnce(&mut CommerceState) -> Result<T> + Send,
        T: Send;
}

pub trait ConfigProvider: Send + Sync {
    fn default_fee_percentage(&self) -> u32;
    fn minimum_fee_cents(&self) -> u64;
    fn fee_schedule(&self) -> &[PlatformFeeRate];
    /// country code -> basis points
    fn tax_rates(&self) -> &BTreeMap<String, u32>;
    fn min_withdrawal_cents(&self) -> u64;
    fn max_withdrawal_cents(&self) -> u64;
    fn point_price_cents(&self) -> u64;
}

/// 外部付款服務
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn method(&self) -> PaymentMethod;

    fn validate_details(&self, details: &PaymentDetails) -> Result<()>;

    async fn charge(&self, amount_cents: u64, details: &PaymentDetails) -> Result<PaymentReceipt>;

    async fn refund(&self, transaction_id: &str, amount_cents: u64, reason: &str) -> Result<()>;

    async fn status(&self, transaction_id: &str) -> Result<PaymentStatus>;

    /// 付款給貢獻者（提領）
    async fn payout(&self, amount_cents: u64, details: &PaymentDetails) -> Result<PaymentReceipt>;
}

#[async_trait]
pub trait EventListener: Send + Sync {
    fn name(&self) -> &str;

    /// 處理事件，回傳後續要發布的事件
    async fn handle(&self, event: &CommerceEvent) -> Result<Vec<CommerceEvent>>;
}
