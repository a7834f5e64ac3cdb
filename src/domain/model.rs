use crate::utils::error::{CommerceError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type Id = Uuid;
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// BOUNTY 項目 metadata 中記錄已建立 bounty 的欄位
pub const BOUNTY_IDS_KEY: &str = "bounty_ids";

/// 帶有 as_str/Display 的狀態列舉
macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

status_enum!(CartStatus {
    Open => "OPEN",
    CheckedOut => "CHECKED_OUT",
    Abandoned => "ABANDONED",
});

status_enum!(OrderStatus {
    Pending => "PENDING",
    Paid => "PAID",
    Failed => "FAILED",
    Refunding => "REFUNDING",
    Refunded => "REFUNDED",
});

status_enum!(LineItemType {
    Bounty => "BOUNTY",
    PlatformFee => "PLATFORM_FEE",
    SalesTax => "SALES_TAX",
    IncreaseAdjustment => "INCREASE_ADJUSTMENT",
    DecreaseAdjustment => "DECREASE_ADJUSTMENT",
    PointGrant => "POINT_GRANT",
});

status_enum!(RewardType {
    Usd => "USD",
    Points => "Points",
});

status_enum!(
    /// FUNDED → OPEN → CLAIMED → IN_REVIEW → COMPLETED，任何未完成狀態都可以取消
    BountyStatus {
        Funded => "FUNDED",
        Open => "OPEN",
        Claimed => "CLAIMED",
        InReview => "IN_REVIEW",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
    }
);

status_enum!(PaymentMethod {
    PayPal => "PayPal",
    Usdt => "USDT",
    CreditCard => "CreditCard",
});

status_enum!(WalletTransactionType {
    Credit => "CREDIT",
    Debit => "DEBIT",
});

status_enum!(ContributorTransactionType {
    Credit => "Credit",
    Debit => "Debit",
    Withdrawal => "Withdrawal",
});

status_enum!(TransactionStatus {
    Pending => "Pending",
    Completed => "Completed",
    Failed => "Failed",
});

status_enum!(PointTransactionType {
    Grant => "GRANT",
    Use => "USE",
    Refund => "REFUND",
    Earn => "EARN",
    Transfer => "TRANSFER",
});

status_enum!(GrantType {
    Free => "FREE",
    Paid => "PAID",
});

status_enum!(GrantRequestStatus {
    Pending => "Pending",
    Approved => "Approved",
    Rejected => "Rejected",
});

impl FromStr for PaymentMethod {
    type Err = CommerceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "paypal" => Ok(Self::PayPal),
            "usdt" => Ok(Self::Usdt),
            "creditcard" | "credit_card" | "credit-card" => Ok(Self::CreditCard),
            _ => Err(CommerceError::UnsupportedPaymentMethod {
                method: s.to_string(),
            }),
        }
    }
}

impl FromStr for RewardType {
    type Err = CommerceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::Usd),
            "points" => Ok(Self::Points),
            _ => Err(CommerceError::validation(format!("Invalid reward type: {}", s))),
        }
    }
}

impl BountyStatus {
    pub fn can_transition_to(&self, next: BountyStatus) -> bool {
        use BountyStatus::*;
        matches!(
            (self, next),
            (Funded, Open)
                | (Funded, Cancelled)
                | (Open, Claimed)
                | (Open, Cancelled)
                | (Claimed, InReview)
                | (Claimed, Open)
                | (Claimed, Cancelled)
                | (InReview, Completed)
                | (InReview, Claimed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organisation {
    pub id: Id,
    pub name: String,
    pub country: String,
    pub tax_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganisationWallet {
    pub id: Id,
    pub organisation_id: Id,
    pub balance_usd_cents: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Id,
    pub wallet_id: Id,
    pub amount_cents: u64,
    pub transaction_type: WalletTransactionType,
    pub description: String,
    pub payment_method: Option<PaymentMethod>,
    pub transaction_id: Option<String>,
    pub related_order_id: Option<Id>,
    pub created_at: DateTime<Utc>,
}

/// 購物車中的 bounty 快照。商務端只保存這份資料，不直接引用產品管理端的紀錄。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BountyPurchaseData {
    pub product_id: String,
    #[serde(default)]
    pub challenge_id: Option<String>,
    #[serde(default)]
    pub competition_id: Option<String>,
    pub title: String,
    pub description: String,
    pub reward_type: RewardType,
    pub reward_in_usd_cents: Option<u64>,
    pub reward_in_points: Option<u64>,
    #[serde(default)]
    pub skill_id: Option<String>,
    #[serde(default)]
    pub expertise_ids: Vec<String>,
}

impl BountyPurchaseData {
    pub fn usd(product_id: &str, title: &str, reward_in_usd_cents: u64) -> Self {
        Self {
            product_id: product_id.to_string(),
            challenge_id: None,
            competition_id: None,
            title: title.to_string(),
            description: String::new(),
            reward_type: RewardType::Usd,
            reward_in_usd_cents: Some(reward_in_usd_cents),
            reward_in_points: None,
            skill_id: None,
            expertise_ids: Vec::new(),
        }
    }

    pub fn points(product_id: &str, title: &str, reward_in_points: u64) -> Self {
        Self {
            reward_type: RewardType::Points,
            reward_in_usd_cents: None,
            reward_in_points: Some(reward_in_points),
            ..Self::usd(product_id, title, 0)
        }
    }

    pub fn with_challenge(mut self, challenge_id: &str) -> Self {
        self.challenge_id = Some(challenge_id.to_string());
        self
    }

    pub fn with_competition(mut self, competition_id: &str) -> Self {
        self.competition_id = Some(competition_id.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_reward(
            self.reward_type,
            self.reward_in_usd_cents,
            self.reward_in_points,
        )?;

        if self.product_id.trim().is_empty() {
            return Err(CommerceError::validation("Bounty must belong to a product"));
        }
        if self.title.trim().is_empty() {
            return Err(CommerceError::validation("Bounty title cannot be empty"));
        }
        if self.challenge_id.is_some() && self.competition_id.is_some() {
            return Err(CommerceError::validation(
                "Bounty cannot be associated with both a Challenge and a Competition",
            ));
        }
        Ok(())
    }

    pub fn to_metadata(&self) -> Result<Metadata> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(CommerceError::validation("Purchase data must serialize to an object")),
        }
    }

    pub fn from_metadata(metadata: &Metadata) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(
            metadata.clone(),
        ))?)
    }
}

/// USD 獎勵只能有 cents，Points 獎勵只能有點數，而且都必須大於零
pub fn validate_reward(
    reward_type: RewardType,
    reward_in_usd_cents: Option<u64>,
    reward_in_points: Option<u64>,
) -> Result<()> {
    match reward_type {
        RewardType::Usd => {
            if reward_in_points.is_some() {
                return Err(CommerceError::validation(
                    "For USD rewards, reward_in_points should be None",
                ));
            }
            match reward_in_usd_cents {
                Some(cents) if cents > 0 => Ok(()),
                _ => Err(CommerceError::validation(
                    "USD rewards require a positive reward_in_usd_cents",
                )),
            }
        }
        RewardType::Points => {
            if reward_in_usd_cents.is_some() {
                return Err(CommerceError::validation(
                    "For Points rewards, reward_in_usd_cents should be None",
                ));
            }
            match reward_in_points {
                Some(points) if points > 0 => Ok(()),
                _ => Err(CommerceError::validation(
                    "Points rewards require a positive reward_in_points",
                )),
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Id,
    pub item_type: LineItemType,
    pub quantity: u32,
    pub unit_price_usd_cents: Option<u64>,
    pub unit_price_points: Option<u64>,
    pub description: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub point_grant_request_id: Option<Id>,
    pub created_at: DateTime<Utc>,
}

impl LineItem {
    pub fn new(item_type: LineItemType, quantity: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_type,
            quantity,
            unit_price_usd_cents: None,
            unit_price_points: None,
            description: String::new(),
            metadata: Metadata::new(),
            point_grant_request_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn total_price_usd_cents(&self) -> Result<u64> {
        u64::from(self.quantity)
            .checked_mul(self.unit_price_usd_cents.unwrap_or(0))
            .ok_or_else(|| CommerceError::overflow(format!("line item {} USD total", self.id)))
    }

    pub fn total_price_points(&self) -> Result<u64> {
        u64::from(self.quantity)
            .checked_mul(self.unit_price_points.unwrap_or(0))
            .ok_or_else(|| CommerceError::overflow(format!("line item {} points total", self.id)))
    }

    /// BOUNTY 與 POINT_GRANT 是使用者加入的項目，其它都是系統計算出來的
    pub fn is_purchasable(&self) -> bool {
        matches!(
            self.item_type,
            LineItemType::Bounty | LineItemType::PointGrant
        )
    }

    pub fn purchase_data(&self) -> Result<BountyPurchaseData> {
        BountyPurchaseData::from_metadata(&self.metadata)
    }

    /// 付款處理後寫入的 bounty id，每個數量單位一個
    pub fn bounty_ids(&self) -> Vec<Id> {
        self.metadata
            .get(BOUNTY_IDS_KEY)
            .and_then(|v| v.as_array())
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| Uuid::parse_str(s).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_funded(&self) -> bool {
        self.metadata.contains_key(BOUNTY_IDS_KEY)
    }

    pub fn set_bounty_ids(&mut self, ids: &[Id]) {
        let values = ids
            .iter()
            .map(|id| serde_json::Value::String(id.to_string()))
            .collect();
        self.metadata
            .insert(BOUNTY_IDS_KEY.to_string(), serde_json::Value::Array(values));
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: Id,
    pub organisation_id: Id,
    pub status: CartStatus,
    pub line_items: Vec<LineItem>,
    pub total_usd_cents_excluding_fees_and_taxes: u64,
    pub total_usd_cents_including_fees_and_taxes: u64,
    pub total_points: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(organisation_id: Id) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organisation_id,
            status: CartStatus::Open,
            line_items: Vec::new(),
            total_usd_cents_excluding_fees_and_taxes: 0,
            total_usd_cents_including_fees_and_taxes: 0,
            total_points: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn items_of(&self, item_type: LineItemType) -> impl Iterator<Item = &LineItem> {
        self.line_items
            .iter()
            .filter(move |item| item.item_type == item_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOrder {
    pub id: Id,
    pub cart_id: Id,
    pub organisation_id: Id,
    pub status: OrderStatus,
    pub line_items: Vec<LineItem>,
    pub total_usd_cents_excluding_fees_and_taxes: u64,
    pub total_usd_cents_including_fees_and_taxes: u64,
    pub total_points: u64,
    pub payment_method: Option<PaymentMethod>,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SalesOrder {
    pub fn items_of(&self, item_type: LineItemType) -> impl Iterator<Item = &LineItem> {
        self.line_items
            .iter()
            .filter(move |item| item.item_type == item_type)
    }

    pub fn funded_bounty_ids(&self) -> Vec<Id> {
        self.items_of(LineItemType::Bounty)
            .flat_map(|item| item.bounty_ids())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bounty {
    pub id: Id,
    pub product_id: String,
    pub challenge_id: Option<String>,
    pub competition_id: Option<String>,
    pub title: String,
    pub description: String,
    pub status: BountyStatus,
    pub reward_type: RewardType,
    pub reward_in_usd_cents: Option<u64>,
    pub reward_in_points: Option<u64>,
    pub final_reward_in_usd_cents: Option<u64>,
    pub final_reward_in_points: Option<u64>,
    pub skill_id: Option<String>,
    pub expertise_ids: Vec<String>,
    pub claimant_id: Option<Id>,
    pub sales_order_id: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributorWallet {
    pub id: Id,
    pub contributor_id: Id,
    pub balance_usd_cents: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributorWalletTransaction {
    pub id: Id,
    pub wallet_id: Id,
    pub amount_cents: u64,
    pub transaction_type: ContributorTransactionType,
    pub description: String,
    pub status: TransactionStatus,
    pub payment_method: Option<PaymentMethod>,
    pub transaction_id: Option<String>,
    pub bounty_id: Option<Id>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointAccount {
    pub id: Id,
    pub owner_id: Id,
    pub balance: u64,
}

impl PointAccount {
    pub fn new(owner_id: Id) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            balance: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointTransaction {
    pub id: Id,
    pub account_id: Id,
    pub amount: u64,
    pub transaction_type: PointTransactionType,
    pub description: String,
    pub related_order_id: Option<Id>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointGrantRequest {
    pub id: Id,
    pub organisation_id: Id,
    pub number_of_points: u64,
    pub requested_by: Option<Id>,
    pub rationale: String,
    pub status: GrantRequestStatus,
    pub grant_type: GrantType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointGrant {
    pub id: Id,
    pub organisation_id: Id,
    pub amount: u64,
    pub granted_by: Option<Id>,
    pub rationale: String,
    pub grant_request_id: Option<Id>,
    pub sales_order_line_item_id: Option<Id>,
    pub created_at: DateTime<Utc>,
}

impl PointGrant {
    pub fn is_paid_grant(&self) -> bool {
        self.sales_order_line_item_id.is_some()
    }
}

/// 平台手續費設定，applies_from 之後生效
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformFeeRate {
    pub percentage: u32,
    pub applies_from: DateTime<Utc>,
}

/// 所有商務資料的集合，也是 Store 一次提交的單位
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommerceState {
    pub organisations: BTreeMap<Id, Organisation>,
    /// key: organisation id
    pub wallets: BTreeMap<Id, OrganisationWallet>,
    pub wallet_transactions: Vec<WalletTransaction>,
    pub carts: BTreeMap<Id, Cart>,
    pub sales_orders: BTreeMap<Id, SalesOrder>,
    pub bounties: BTreeMap<Id, Bounty>,
    /// key: contributor id
    pub contributor_wallets: BTreeMap<Id, ContributorWallet>,
    pub contributor_wallet_transactions: Vec<ContributorWalletTransaction>,
    /// key: organisation id
    pub organisation_point_accounts: BTreeMap<Id, PointAccount>,
    /// key: contributor id
    pub contributor_point_accounts: BTreeMap<Id, PointAccount>,
    pub point_transactions: Vec<PointTransaction>,
    pub point_grant_requests: BTreeMap<Id, PointGrantRequest>,
    pub point_grants: BTreeMap<Id, PointGrant>,
}

impl CommerceState {
    pub fn organisation(&self, id: Id) -> Result<&Organisation> {
        self.organisations
            .get(&id)
            .ok_or_else(|| CommerceError::not_found("Organisation", id))
    }

    pub fn wallet(&self, organisation_id: Id) -> Result<&OrganisationWallet> {
        self.wallets
            .get(&organisation_id)
            .ok_or_else(|| CommerceError::not_found("OrganisationWallet", organisation_id))
    }

    pub fn wallet_mut(&mut self, organisation_id: Id) -> Result<&mut OrganisationWallet> {
        self.wallets
            .get_mut(&organisation_id)
            .ok_or_else(|| CommerceError::not_found("OrganisationWallet", organisation_id))
    }

    pub fn cart(&self, id: Id) -> Result<&Cart> {
        self.carts
            .get(&id)
            .ok_or_else(|| CommerceError::not_found("Cart", id))
    }

    pub fn cart_mut(&mut self, id: Id) -> Result<&mut Cart> {
        self.carts
            .get_mut(&id)
            .ok_or_else(|| CommerceError::not_found("Cart", id))
    }

    pub fn sales_order(&self, id: Id) -> Result<&SalesOrder> {
        self.sales_orders
            .get(&id)
            .ok_or_else(|| CommerceError::not_found("SalesOrder", id))
    }

    pub fn sales_order_mut(&mut self, id: Id) -> Result<&mut SalesOrder> {
        self.sales_orders
            .get_mut(&id)
            .ok_or_else(|| CommerceError::not_found("SalesOrder", id))
    }

    pub fn order_for_cart(&self, cart_id: Id) -> Option<&SalesOrder> {
        self.sales_orders
            .values()
            .find(|order| order.cart_id == cart_id)
    }

    pub fn bounty(&self, id: Id) -> Result<&Bounty> {
        self.bounties
            .get(&id)
            .ok_or_else(|| CommerceError::not_found("Bounty", id))
    }

    pub fn bounty_mut(&mut self, id: Id) -> Result<&mut Bounty> {
        self.bounties
            .get_mut(&id)
            .ok_or_else(|| CommerceError::not_found("Bounty", id))
    }

    pub fn point_grant_request(&self, id: Id) -> Result<&PointGrantRequest> {
        self.point_grant_requests
            .get(&id)
            .ok_or_else(|| CommerceError::not_found("PointGrantRequest", id))
    }

    pub fn organisation_points(&self, organisation_id: Id) -> u64 {
        self.organisation_point_accounts
            .get(&organisation_id)
            .map(|account| account.balance)
            .unwrap_or(0)
    }

    pub fn transactions_for_wallet(&self, wallet_id: Id) -> Vec<&WalletTransaction> {
        self.wallet_transactions
            .iter()
            .filter(|tx| tx.wallet_id == wallet_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_consistency() {
        assert!(validate_reward(RewardType::Usd, Some(10_000), None).is_ok());
        assert!(validate_reward(RewardType::Usd, Some(10_000), Some(5)).is_err());
        assert!(validate_reward(RewardType::Usd, Some(0), None).is_err());
        assert!(validate_reward(RewardType::Points, None, Some(100)).is_ok());
        assert!(validate_reward(RewardType::Points, Some(100), Some(100)).is_err());
        assert!(validate_reward(RewardType::Points, None, None).is_err());
    }

    #[test]
    fn test_purchase_data_rejects_challenge_and_competition() {
        let data = BountyPurchaseData::usd("product-1", "Fix login", 5_000)
            .with_challenge("challenge-1")
            .with_competition("competition-1");
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_purchase_data_metadata_keeps_extra_keys_out() {
        let data = BountyPurchaseData::points("product-1", "Write docs", 250)
            .with_challenge("challenge-9");
        let mut item = LineItem::new(LineItemType::Bounty, 2);
        item.metadata = data.to_metadata().unwrap();
        let ids = [Uuid::new_v4(), Uuid::new_v4()];
        item.set_bounty_ids(&ids);
        let metadata = item.metadata.clone();

        assert!(item.is_funded());
        assert_eq!(item.bounty_ids(), ids.to_vec());
        let restored = BountyPurchaseData::from_metadata(&metadata).unwrap();
        assert_eq!(restored, data);
        assert_eq!(metadata.get("reward_type").unwrap(), "Points");
    }

    #[test]
    fn test_line_item_totals() {
        let mut item = LineItem::new(LineItemType::Bounty, 3);
        item.unit_price_usd_cents = Some(2_500);
        assert_eq!(item.total_price_usd_cents().unwrap(), 7_500);
        assert_eq!(item.total_price_points().unwrap(), 0);

        item.unit_price_usd_cents = Some(u64::MAX);
        assert!(item.total_price_usd_cents().is_err());
    }

    #[test]
    fn test_bounty_transitions() {
        assert!(BountyStatus::Funded.can_transition_to(BountyStatus::Open));
        assert!(BountyStatus::Claimed.can_transition_to(BountyStatus::Open));
        assert!(!BountyStatus::Funded.can_transition_to(BountyStatus::Completed));
        assert!(!BountyStatus::Completed.can_transition_to(BountyStatus::Cancelled));
    }

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!("paypal".parse::<PaymentMethod>().unwrap(), PaymentMethod::PayPal);
        assert_eq!("USDT".parse::<PaymentMethod>().unwrap(), PaymentMethod::Usdt);
        assert!("cash".parse::<PaymentMethod>().is_err());
    }
}
