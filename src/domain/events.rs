use crate::domain::model::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const ORDER_PAYMENT_COMPLETED: &str = "order_payment_completed";
pub const ORDER_PAYMENT_FAILED: &str = "order_payment_failed";
pub const ORDER_PROCESSING_COMPLETED: &str = "order_processing_completed";
pub const ORDER_PROCESSING_FAILED: &str = "order_processing_failed";
pub const BOUNTY_FUNDED: &str = "bounty_funded";
pub const ORDER_REFUNDED: &str = "order_refunded";

/// 商務端與產品管理端之間傳遞的事件。事件只帶資料，不含任何處理邏輯。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CommerceEvent {
    OrderPaymentCompleted {
        sales_order_id: Option<Id>,
    },
    OrderPaymentFailed {
        sales_order_id: Id,
        error: String,
    },
    OrderProcessingCompleted {
        sales_order_id: Id,
        message: String,
        bounty_ids: Vec<Id>,
    },
    OrderProcessingFailed {
        sales_order_id: Option<Id>,
        error: String,
    },
    BountyFunded {
        bounty_id: Id,
        sales_order_id: Id,
        product_id: String,
    },
    OrderRefunded {
        sales_order_id: Id,
        amount_cents: u64,
        reason: String,
    },
}

impl CommerceEvent {
    pub fn payment_completed(sales_order_id: Id) -> Self {
        Self::OrderPaymentCompleted {
            sales_order_id: Some(sales_order_id),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OrderPaymentCompleted { .. } => ORDER_PAYMENT_COMPLETED,
            Self::OrderPaymentFailed { .. } => ORDER_PAYMENT_FAILED,
            Self::OrderProcessingCompleted { .. } => ORDER_PROCESSING_COMPLETED,
            Self::OrderProcessingFailed { .. } => ORDER_PROCESSING_FAILED,
            Self::BountyFunded { .. } => BOUNTY_FUNDED,
            Self::OrderRefunded { .. } => ORDER_REFUNDED,
        }
    }

    pub fn sales_order_id(&self) -> Option<Id> {
        match self {
            Self::OrderPaymentCompleted { sales_order_id }
            | Self::OrderProcessingFailed { sales_order_id, .. } => *sales_order_id,
            Self::OrderPaymentFailed { sales_order_id, .. }
            | Self::OrderProcessingCompleted { sales_order_id, .. }
            | Self::BountyFunded { sales_order_id, .. }
            | Self::OrderRefunded { sales_order_id, .. } => Some(*sales_order_id),
        }
    }

    /// 事件內容，不含事件名稱
    pub fn payload(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.remove("event");
                serde_json::Value::Object(map)
            }
            _ => json!({ "sales_order_id": self.sales_order_id() }),
        }
    }
}

/// 事件紀錄
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// 匯流排內遞增的序號
    #[serde(default)]
    pub sequence: u64,
    pub event_name: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub processed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_event_names_and_payload() {
        let order_id = Uuid::new_v4();
        let event = CommerceEvent::payment_completed(order_id);
        assert_eq!(event.name(), "order_payment_completed");

        let payload = event.payload();
        assert_eq!(payload["sales_order_id"], order_id.to_string());
        assert!(payload.get("event").is_none());
    }

    #[test]
    fn test_processing_failed_without_order_id() {
        let event = CommerceEvent::OrderProcessingFailed {
            sales_order_id: None,
            error: "Missing required field 'sales_order_id' in payload".to_string(),
        };
        assert_eq!(event.sales_order_id(), None);
        assert!(event.payload()["sales_order_id"].is_null());
    }
}
