use crate::app::listeners::OrderPaidListener;
use crate::config::toml_config::EventBusMode;
use crate::core::bounty::BountyService;
use crate::core::cart::CartService;
use crate::core::event_bus::EventBus;
use crate::core::payment::PaymentService;
use crate::core::points::PointsService;
use crate::core::pricing::{FeeService, TaxService};
use crate::core::sales_order::SalesOrderService;
use crate::core::wallet::{ensure_organisation_wallet, WalletService};
use crate::domain::events::ORDER_PAYMENT_COMPLETED;
use crate::domain::model::{Id, OrderStatus, Organisation, PaymentMethod, PointAccount};
use crate::domain::ports::{ConfigProvider, PaymentDetails, Store};
use crate::utils::error::{CommerceError, Result};
use crate::utils::validation::{validate_country_code, validate_non_empty_string};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// 結帳結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub sales_order_id: Id,
    pub cart_id: Id,
    pub status: OrderStatus,
    pub total_usd_cents_excluding_fees_and_taxes: u64,
    pub total_usd_cents_including_fees_and_taxes: u64,
    pub total_points: u64,
    pub payment_method: Option<PaymentMethod>,
    pub transaction_id: Option<String>,
    pub funded_bounty_ids: Vec<Id>,
}

/// 把購物車、訂單、付款與事件串起來的進入點
pub struct CheckoutEngine<S: Store> {
    store: Arc<S>,
    bus: EventBus,
    carts: CartService<S>,
    orders: SalesOrderService<S>,
    wallets: WalletService<S>,
    bounties: BountyService<S>,
    points: PointsService<S>,
}

impl<S: Store + 'static> CheckoutEngine<S> {
    /// 建立所有服務，並在事件匯流排上註冊訂單處理 listener
    pub fn new(store: Arc<S>, config: &dyn ConfigProvider, payments: PaymentService, bus: EventBus) -> Self {
        let payments = Arc::new(payments);

        bus.register_listener(
            ORDER_PAYMENT_COMPLETED,
            Arc::new(OrderPaidListener::new(store.clone())),
        );

        Self {
            carts: CartService::new(
                store.clone(),
                FeeService::from_config(config),
                TaxService::from_config(config),
                config.point_price_cents(),
            ),
            orders: SalesOrderService::new(store.clone(), payments.clone(), bus.clone()),
            wallets: WalletService::new(
                store.clone(),
                payments,
                config.min_withdrawal_cents(),
                config.max_withdrawal_cents(),
            ),
            bounties: BountyService::new(store.clone()),
            points: PointsService::new(store.clone()),
            store,
            bus,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn carts(&self) -> &CartService<S> {
        &self.carts
    }

    pub fn orders(&self) -> &SalesOrderService<S> {
        &self.orders
    }

    pub fn wallets(&self) -> &WalletService<S> {
        &self.wallets
    }

    pub fn bounties(&self) -> &BountyService<S> {
        &self.bounties
    }

    pub fn points(&self) -> &PointsService<S> {
        &self.points
    }

    /// 建立組織，同時建立空的錢包與點數帳戶
    pub async fn create_organisation(
        &self,
        name: &str,
        country: &str,
        tax_id: Option<String>,
    ) -> Result<Organisation> {
        validate_non_empty_string("name", name)?;
        validate_country_code("country", country)?;

        let organisation = self
            .store
            .atomic(|state| {
                let organisation = Organisation {
                    id: Uuid::new_v4(),
                    name: name.to_string(),
                    country: country.to_string(),
                    tax_id,
                    created_at: Utc::now(),
                };
                state.organisations.insert(organisation.id, organisation.clone());
                ensure_organisation_wallet(state, organisation.id)?;
                state
                    .organisation_point_accounts
                    .insert(organisation.id, PointAccount::new(organisation.id));
                Ok(organisation)
            })
            .await?;

        tracing::info!("🏢 Organisation {} ({}) created", organisation.name, organisation.id);
        Ok(organisation)
    }

    /// 驗證購物車 -> 建立（或沿用尚未付款的）訂單 -> 付款 -> 等待事件處理完成
    pub async fn checkout(
        &self,
        cart_id: Id,
        method: Option<PaymentMethod>,
        details: &PaymentDetails,
    ) -> Result<CheckoutReceipt> {
        tracing::info!("🛒 Starting checkout for cart {}", cart_id);

        // 餘額不足而保留的 PENDING 訂單可以直接重試付款
        let order = match self.orders.order_for_cart(cart_id).await? {
            Some(order) if order.status == OrderStatus::Pending => {
                tracing::debug!("Reusing pending sales order {}", order.id);
                order
            }
            Some(order) => {
                return Err(CommerceError::invalid_state(
                    "SalesOrder",
                    order.id,
                    OrderStatus::Pending,
                    order.status,
                ));
            }
            None => {
                let errors = self.carts.validate(cart_id).await?;
                if !errors.is_empty() {
                    return Err(CommerceError::ValidationErrors { errors });
                }
                self.orders.create_from_cart(cart_id).await?
            }
        };

        self.orders.process_payment(order.id, method, details).await?;

        if self.bus.mode() == EventBusMode::Async {
            self.bus.wait_idle().await;
        }

        let order = self.orders.get_order(order.id).await?;
        let receipt = CheckoutReceipt {
            sales_order_id: order.id,
            cart_id: order.cart_id,
            status: order.status,
            total_usd_cents_excluding_fees_and_taxes: order.total_usd_cents_excluding_fees_and_taxes,
            total_usd_cents_including_fees_and_taxes: order.total_usd_cents_including_fees_and_taxes,
            total_points: order.total_points,
            payment_method: order.payment_method,
            transaction_id: order.transaction_id.clone(),
            funded_bounty_ids: order.funded_bounty_ids(),
        };

        tracing::info!(
            "🎉 Checkout complete: order {} funded {} bounties",
            receipt.sales_order_id,
            receipt.funded_bounty_ids.len()
        );
        Ok(receipt)
    }
}
