use crate::core::sales_order::process_paid_items;
use crate::domain::events::CommerceEvent;
use crate::domain::ports::{EventListener, Store};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// 收到 order_payment_completed 後建立 FUNDED bounty。
///
/// 處理結果以事件回報：成功時每個新 bounty 一個 `bounty_funded`，最後一個
/// `order_processing_completed`；失敗時 `order_processing_failed`。
pub struct OrderPaidListener<S: Store> {
    store: Arc<S>,
}

impl<S: Store> OrderPaidListener<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: Store + 'static> EventListener for OrderPaidListener<S> {
    fn name(&self) -> &str {
        "order_paid_listener"
    }

    async fn handle(&self, event: &CommerceEvent) -> Result<Vec<CommerceEvent>> {
        let Some(sales_order_id) = event.sales_order_id() else {
            let error = "Missing required field 'sales_order_id' in payload".to_string();
            tracing::error!("❌ Invalid payload for sales order processing: {}", error);
            return Ok(vec![CommerceEvent::OrderProcessingFailed {
                sales_order_id: None,
                error,
            }]);
        };

        match process_paid_items(self.store.as_ref(), sales_order_id).await {
            Ok(bounty_ids) => {
                let product_ids = self
                    .store
                    .read(|state| {
                        bounty_ids
                            .iter()
                            .map(|id| state.bounty(*id).map(|b| (b.id, b.product_id.clone())))
                            .collect::<Result<Vec<_>>>()
                    })
                    .await?;

                let mut events: Vec<CommerceEvent> = product_ids
                    .into_iter()
                    .map(|(bounty_id, product_id)| CommerceEvent::BountyFunded {
                        bounty_id,
                        sales_order_id,
                        product_id,
                    })
                    .collect();
                events.push(CommerceEvent::OrderProcessingCompleted {
                    sales_order_id,
                    message: format!("{} bounties funded", bounty_ids.len()),
                    bounty_ids,
                });
                Ok(events)
            }
            Err(e) => {
                tracing::error!("❌ Failed to process sales order {}: {}", sales_order_id, e);
                Ok(vec![CommerceEvent::OrderProcessingFailed {
                    sales_order_id: Some(sales_order_id),
                    error: e.to_string(),
                }])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_store::MemoryStore;
    use crate::domain::events::{ORDER_PROCESSING_FAILED, ORDER_PROCESSING_COMPLETED};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_missing_order_id_reports_failure() {
        let listener = OrderPaidListener::new(Arc::new(MemoryStore::new()));
        let event = CommerceEvent::OrderPaymentCompleted { sales_order_id: None };

        let events = listener.handle(&event).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), ORDER_PROCESSING_FAILED);
        assert_eq!(events[0].sales_order_id(), None);
    }

    #[tokio::test]
    async fn test_unknown_order_reports_failure() {
        let listener = OrderPaidListener::new(Arc::new(MemoryStore::new()));
        let order_id = Uuid::new_v4();

        let events = listener
            .handle(&CommerceEvent::payment_completed(order_id))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), ORDER_PROCESSING_FAILED);
        assert_eq!(events[0].sales_order_id(), Some(order_id));
        assert_ne!(events[0].name(), ORDER_PROCESSING_COMPLETED);
    }
}
