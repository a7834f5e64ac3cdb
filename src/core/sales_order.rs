use crate::core::cart::validation_errors;
use crate::core::event_bus::EventBus;
use crate::core::payment::PaymentService;
use crate::core::{bounty, points, wallet};
use crate::domain::events::CommerceEvent;
use crate::domain::model::{
    BountyStatus, CartStatus, CommerceState, GrantRequestStatus, Id, LineItemType, OrderStatus,
    PaymentMethod, PointTransactionType, SalesOrder,
};
use crate::domain::ports::{PaymentDetails, PaymentReceipt, Store};
use crate::utils::error::{CommerceError, Result};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// 付款完成後的處理：每個還沒處理過的 BOUNTY 項目依數量建立 FUNDED bounty，
/// 並把新的 id 清單寫回項目 metadata；POINT_GRANT 項目發放點數。整個步驟是一個交易。
///
/// 回傳這次新建立的 bounty id。
pub async fn process_paid_items<S: Store>(store: &S, order_id: Id) -> Result<Vec<Id>> {
    let created = store
        .atomic(|state| {
            let order = state.sales_order(order_id)?;
            if order.status != OrderStatus::Paid {
                return Err(CommerceError::invalid_state(
                    "SalesOrder",
                    order_id,
                    OrderStatus::Paid,
                    order.status,
                ));
            }
            let lines = order.line_items.clone();

            let mut created = Vec::new();
            for (index, item) in lines.iter().enumerate() {
                match item.item_type {
                    LineItemType::Bounty if !item.is_funded() => {
                        let data = item.purchase_data()?;
                        let mut funded = Vec::with_capacity(item.quantity as usize);
                        for _ in 0..item.quantity {
                            funded.push(bounty::create_from_purchase(state, &data, order_id)?.id);
                        }

                        state.sales_order_mut(order_id)?.line_items[index].set_bounty_ids(&funded);
                        created.extend(funded);
                    }
                    LineItemType::PointGrant => {
                        let request_id = item.point_grant_request_id.ok_or_else(|| {
                            CommerceError::validation(format!(
                                "Point grant line {} has no request",
                                item.id
                            ))
                        })?;
                        points::process_paid_grant(state, request_id, item.id)?;
                    }
                    _ => {}
                }
            }

            state.sales_order_mut(order_id)?.updated_at = Utc::now();
            Ok(created)
        })
        .await;

    match &created {
        Ok(ids) => tracing::info!("🎯 Order {} processed: {} bounties funded", order_id, ids.len()),
        Err(e) => tracing::error!("❌ Processing paid order {} failed: {}", order_id, e),
    }
    created
}

pub struct SalesOrderService<S: Store> {
    store: Arc<S>,
    payments: Arc<PaymentService>,
    bus: EventBus,
}

impl<S: Store> SalesOrderService<S> {
    pub fn new(store: Arc<S>, payments: Arc<PaymentService>, bus: EventBus) -> Self {
        Self { store, payments, bus }
    }

    pub async fn get_order(&self, order_id: Id) -> Result<SalesOrder> {
        self.store.read(|state| state.sales_order(order_id).cloned()).await
    }

    pub async fn order_for_cart(&self, cart_id: Id) -> Result<Option<SalesOrder>> {
        self.store
            .read(|state| Ok(state.order_for_cart(cart_id).cloned()))
            .await
    }

    /// 從購物車建立訂單，項目（含 metadata）與總額原樣複製。每個購物車只能有一張訂單。
    pub async fn create_from_cart(&self, cart_id: Id) -> Result<SalesOrder> {
        let result = self
            .store
            .atomic(|state| {
                let cart = state.cart(cart_id)?;
                let errors = validation_errors(state, cart);
                if !errors.is_empty() {
                    return Err(CommerceError::ValidationErrors { errors });
                }
                if state.order_for_cart(cart_id).is_some() {
                    return Err(CommerceError::validation(
                        "Sales order already exists for this cart",
                    ));
                }

                let now = Utc::now();
                let order = SalesOrder {
                    id: Uuid::new_v4(),
                    cart_id,
                    organisation_id: cart.organisation_id,
                    status: OrderStatus::Pending,
                    line_items: cart.line_items.clone(),
                    total_usd_cents_excluding_fees_and_taxes: cart
                        .total_usd_cents_excluding_fees_and_taxes,
                    total_usd_cents_including_fees_and_taxes: cart
                        .total_usd_cents_including_fees_and_taxes,
                    total_points: cart.total_points,
                    payment_method: None,
                    transaction_id: None,
                    failure_reason: None,
                    created_at: now,
                    updated_at: now,
                };
                state.sales_orders.insert(order.id, order.clone());
                Ok(order)
            })
            .await;

        match &result {
            Ok(order) => tracing::info!("🧾 Sales order {} created from cart {}", order.id, cart_id),
            Err(e) => tracing::warn!("⚠️ Cannot create sales order from cart {}: {}", cart_id, e),
        }
        result
    }

    /// 付款前檢查，回傳所有問題（僅供參考，process_payment 會再檢查一次）
    pub async fn validate(&self, order_id: Id) -> Result<Vec<String>> {
        self.store
            .read(|state| {
                let order = state.sales_order(order_id)?;
                let mut errors = Vec::new();

                if order.status != OrderStatus::Pending {
                    errors.push("Order is not in pending status".to_string());
                }
                if order.line_items.is_empty() {
                    errors.push("Order has no line items".to_string());
                }
                if order.total_usd_cents_including_fees_and_taxes == 0 && order.total_points == 0 {
                    errors.push("Order total must be greater than zero".to_string());
                }

                let balance = state
                    .wallets
                    .get(&order.organisation_id)
                    .map(|w| w.balance_usd_cents)
                    .unwrap_or(0);
                if balance < order.total_usd_cents_including_fees_and_taxes {
                    errors.push("Insufficient funds in organisation wallet".to_string());
                }
                if state.organisation_points(order.organisation_id) < order.total_points {
                    errors.push("Insufficient points in organisation account".to_string());
                }

                Ok(errors)
            })
            .await
    }

    /// 付款流程：
    /// 1. 訂單必須是 PENDING
    /// 2. 錢包餘額不足時由外部付款閘道收取整筆 USD 金額並存入錢包
    /// 3. 交易內扣款、扣點數、訂單標記 PAID、購物車標記 CHECKED_OUT
    /// 4. 發布 order_payment_completed
    pub async fn process_payment(
        &self,
        order_id: Id,
        method: Option<PaymentMethod>,
        details: &PaymentDetails,
    ) -> Result<SalesOrder> {
        let (order, balance) = self
            .store
            .read(|state| {
                let order = state.sales_order(order_id)?.clone();
                let balance = state
                    .wallets
                    .get(&order.organisation_id)
                    .map(|w| w.balance_usd_cents)
                    .unwrap_or(0);
                Ok((order, balance))
            })
            .await?;

        if order.status != OrderStatus::Pending {
            return Err(CommerceError::invalid_state(
                "SalesOrder",
                order_id,
                OrderStatus::Pending,
                order.status,
            ));
        }

        // 點數與點數申請在收款之前檢查，避免先扣卡再退款
        if let Err(e) = self.store.read(|state| ensure_commitments(state, &order)).await {
            tracing::warn!("⚠️ Order {} cannot be paid: {}", order_id, e);
            return Err(e);
        }

        let usd_total = order.total_usd_cents_including_fees_and_taxes;
        let receipt = if balance >= usd_total {
            None
        } else {
            let Some(method) = method else {
                tracing::warn!(
                    "⚠️ Order {} needs {} cents but wallet has {} and no payment method was given",
                    order_id,
                    usd_total,
                    balance
                );
                return Err(CommerceError::InsufficientFunds {
                    needed: usd_total,
                    available: balance,
                });
            };

            let gateway = self.payments.gateway(method)?;
            gateway.validate_details(details)?;

            tracing::info!("💳 Charging {} cents for order {} via {}", usd_total, order_id, method);
            match gateway.charge(usd_total, details).await {
                Ok(receipt) => Some(receipt),
                Err(e) => {
                    self.mark_failed(order_id, &e.to_string()).await;
                    return Err(e);
                }
            }
        };

        let commit = self.commit_payment(order_id, receipt.as_ref()).await;

        let paid = match commit {
            Ok(order) => order,
            Err(e) => {
                tracing::error!("❌ Payment commit for order {} failed: {}", order_id, e);
                if let Some(receipt) = &receipt {
                    if let Err(refund_error) = self
                        .payments
                        .refund(receipt.method, &receipt.transaction_id, receipt.amount_cents, "order commit failed")
                        .await
                    {
                        tracing::error!(
                            "❌ Refund of {} failed: {}",
                            receipt.transaction_id,
                            refund_error
                        );
                    }
                }
                return Err(e);
            }
        };

        tracing::info!("✅ Order {} paid", order_id);

        // 付款已經完成，事件處理失敗不影響付款結果
        if let Err(e) = self.bus.emit(CommerceEvent::payment_completed(order_id)).await {
            tracing::error!("❌ Dispatch of payment completion for {} failed: {}", order_id, e);
        }

        Ok(paid)
    }

    async fn commit_payment(&self, order_id: Id, receipt: Option<&PaymentReceipt>) -> Result<SalesOrder> {
        self.store
            .atomic(|state| {
                let order = state.sales_order(order_id)?.clone();
                if order.status != OrderStatus::Pending {
                    return Err(CommerceError::invalid_state(
                        "SalesOrder",
                        order_id,
                        OrderStatus::Pending,
                        order.status,
                    ));
                }

                if let Some(receipt) = receipt {
                    wallet::credit_organisation(
                        state,
                        order.organisation_id,
                        receipt.amount_cents,
                        &format!("External payment via {}", receipt.method),
                        Some(receipt.method),
                        Some(receipt.transaction_id.clone()),
                        Some(order_id),
                    )?;
                }

                let usd_total = order.total_usd_cents_including_fees_and_taxes;
                if usd_total > 0 {
                    wallet::debit_organisation(
                        state,
                        order.organisation_id,
                        usd_total,
                        &format!("Payment for order {}", order_id),
                        Some(order_id),
                    )?;
                }
                if order.total_points > 0 {
                    points::debit_organisation_points(
                        state,
                        order.organisation_id,
                        order.total_points,
                        &format!("Points for order {}", order_id),
                        Some(order_id),
                    )?;
                }

                let cart = state.cart_mut(order.cart_id)?;
                cart.status = CartStatus::CheckedOut;
                cart.updated_at = Utc::now();

                let order = state.sales_order_mut(order_id)?;
                order.status = OrderStatus::Paid;
                order.payment_method = receipt.map(|r| r.method);
                order.transaction_id = receipt.map(|r| r.transaction_id.clone());
                order.failure_reason = None;
                order.updated_at = Utc::now();
                Ok(order.clone())
            })
            .await
    }

    async fn mark_failed(&self, order_id: Id, reason: &str) {
        tracing::error!("❌ Payment for order {} declined: {}", order_id, reason);

        let marked = self
            .store
            .atomic(|state| {
                let order = state.sales_order_mut(order_id)?;
                if order.status == OrderStatus::Pending {
                    order.status = OrderStatus::Failed;
                    order.failure_reason = Some(reason.to_string());
                    order.updated_at = Utc::now();
                }
                Ok(())
            })
            .await;
        if let Err(e) = marked {
            tracing::error!("❌ Cannot mark order {} as failed: {}", order_id, e);
        }

        let event = CommerceEvent::OrderPaymentFailed {
            sales_order_id: order_id,
            error: reason.to_string(),
        };
        if let Err(e) = self.bus.emit(event).await {
            tracing::error!("❌ Dispatch of payment failure for {} failed: {}", order_id, e);
        }
    }

    pub async fn process_paid_items(&self, order_id: Id) -> Result<Vec<Id>> {
        process_paid_items(self.store.as_ref(), order_id).await
    }

    /// PAID -> REFUNDING -> REFUNDED
    ///
    /// 先在交易內鎖定訂單並收回點數（退回訂單用掉的點數、收回購買的點數），
    /// 再向付款閘道退款，最後退回錢包並取消還沒開始的 bounty。
    /// 同一張訂單只有一個退款能通過鎖定。
    pub async fn refund_order(&self, order_id: Id, reason: &str) -> Result<SalesOrder> {
        let claimed = self
            .store
            .atomic(|state| {
                let order = state.sales_order(order_id)?.clone();
                if order.status != OrderStatus::Paid {
                    return Err(CommerceError::invalid_state(
                        "SalesOrder",
                        order_id,
                        OrderStatus::Paid,
                        order.status,
                    ));
                }

                reverse_points(state, &order)?;

                let order = state.sales_order_mut(order_id)?;
                order.status = OrderStatus::Refunding;
                order.updated_at = Utc::now();
                Ok(order.clone())
            })
            .await;
        let order = match claimed {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!("⚠️ Order {} cannot be refunded: {}", order_id, e);
                return Err(e);
            }
        };

        let usd_total = order.total_usd_cents_including_fees_and_taxes;
        // 外部收款的部分退回原付款方式，其餘退回錢包
        let external = match (order.payment_method, order.transaction_id.as_deref()) {
            (Some(method), Some(transaction_id)) => {
                if let Err(e) = self
                    .payments
                    .refund(method, transaction_id, usd_total, reason)
                    .await
                {
                    tracing::error!("❌ Gateway refund for order {} failed: {}", order_id, e);
                    self.release_refund(&order).await;
                    return Err(e);
                }
                true
            }
            _ => false,
        };

        let refunded = self
            .store
            .atomic(|state| {
                let order = state.sales_order(order_id)?.clone();
                if order.status != OrderStatus::Refunding {
                    return Err(CommerceError::invalid_state(
                        "SalesOrder",
                        order_id,
                        OrderStatus::Refunding,
                        order.status,
                    ));
                }

                if !external && usd_total > 0 {
                    wallet::credit_organisation(
                        state,
                        order.organisation_id,
                        usd_total,
                        &format!("Refund for order {}", order_id),
                        None,
                        None,
                        Some(order_id),
                    )?;
                }

                for bounty_id in order.funded_bounty_ids() {
                    if let Ok(bounty) = state.bounty_mut(bounty_id) {
                        if bounty.status == BountyStatus::Funded {
                            bounty.status = BountyStatus::Cancelled;
                            bounty.updated_at = Utc::now();
                        }
                    }
                }

                let order = state.sales_order_mut(order_id)?;
                order.status = OrderStatus::Refunded;
                order.failure_reason = Some(reason.to_string());
                order.updated_at = Utc::now();
                Ok(order.clone())
            })
            .await?;

        tracing::info!("↩️ Order {} refunded: {}", order_id, reason);

        let event = CommerceEvent::OrderRefunded {
            sales_order_id: order_id,
            amount_cents: usd_total,
            reason: reason.to_string(),
        };
        if let Err(e) = self.bus.emit(event).await {
            tracing::error!("❌ Dispatch of refund for {} failed: {}", order_id, e);
        }

        Ok(refunded)
    }

    /// 閘道退款失敗：還原點數並把訂單放回 PAID
    async fn release_refund(&self, order: &SalesOrder) {
        let order_id = order.id;
        let released = self
            .store
            .atomic(|state| {
                for item in order.items_of(LineItemType::PointGrant) {
                    points::restore_paid_grant(state, item.id, order_id)?;
                }
                if order.total_points > 0 {
                    points::debit_organisation_points(
                        state,
                        order.organisation_id,
                        order.total_points,
                        &format!("Points for order {}", order_id),
                        Some(order_id),
                    )?;
                }

                let order = state.sales_order_mut(order_id)?;
                order.status = OrderStatus::Paid;
                order.updated_at = Utc::now();
                Ok(())
            })
            .await;

        match released {
            Ok(()) => tracing::info!("🔓 Order {} released back to PAID", order_id),
            Err(e) => tracing::error!(
                "❌ Order {} stays REFUNDING, manual follow-up needed: {}",
                order_id,
                e
            ),
        }
    }
}

/// 訂單用到的點數與點數申請在付款前必須仍然有效
fn ensure_commitments(state: &CommerceState, order: &SalesOrder) -> Result<()> {
    let available = state.organisation_points(order.organisation_id);
    if available < order.total_points {
        return Err(CommerceError::InsufficientPoints {
            needed: order.total_points,
            available,
        });
    }

    for item in order.items_of(LineItemType::PointGrant) {
        let pending = item
            .point_grant_request_id
            .and_then(|id| state.point_grant_requests.get(&id))
            .map(|request| request.status == GrantRequestStatus::Pending)
            .unwrap_or(false);
        if !pending {
            return Err(CommerceError::validation(format!(
                "Point grant request for line item {} is no longer pending",
                item.id
            )));
        }
    }
    Ok(())
}

/// 退回訂單用掉的點數，收回訂單購買的點數
fn reverse_points(state: &mut CommerceState, order: &SalesOrder) -> Result<()> {
    if order.total_points > 0 {
        points::credit_organisation_points(
            state,
            order.organisation_id,
            order.total_points,
            PointTransactionType::Refund,
            &format!("Refund for order {}", order.id),
            Some(order.id),
        )?;
    }
    for item in order.items_of(LineItemType::PointGrant) {
        points::reverse_paid_grant(state, item.id, order.id)?;
    }
    Ok(())
}
