use crate::core::pricing::{checked_add, FeeService, TaxService};
use crate::domain::model::{
    BountyPurchaseData, Cart, CartStatus, CommerceState, GrantRequestStatus, GrantType, Id,
    LineItem, LineItemType, RewardType,
};
use crate::domain::ports::Store;
use crate::utils::error::{CommerceError, Result};
use chrono::Utc;
use std::sync::Arc;

pub struct CartService<S: Store> {
    store: Arc<S>,
    fees: FeeService,
    taxes: TaxService,
    point_price_cents: u64,
}

impl<S: Store> CartService<S> {
    pub fn new(store: Arc<S>, fees: FeeService, taxes: TaxService, point_price_cents: u64) -> Self {
        Self {
            store,
            fees,
            taxes,
            point_price_cents,
        }
    }

    pub async fn create_cart(&self, organisation_id: Id) -> Result<Cart> {
        let cart = self
            .store
            .atomic(|state| {
                state.organisation(organisation_id)?;
                let cart = Cart::new(organisation_id);
                state.carts.insert(cart.id, cart.clone());
                Ok(cart)
            })
            .await?;

        tracing::info!("🛒 Cart {} created for organisation {}", cart.id, organisation_id);
        Ok(cart)
    }

    pub async fn get_cart(&self, cart_id: Id) -> Result<Cart> {
        self.store.read(|state| state.cart(cart_id).cloned()).await
    }

    /// 把 bounty 快照加入購物車，並重新計算總額
    pub async fn add_bounty(
        &self,
        cart_id: Id,
        purchase_data: BountyPurchaseData,
        quantity: u32,
    ) -> Result<LineItem> {
        let result = self
            .store
            .atomic(|state| {
                ensure_mutable(state, cart_id)?;
                purchase_data.validate()?;
                if quantity == 0 {
                    return Err(CommerceError::validation("Quantity must be at least 1"));
                }

                let cart = state.cart(cart_id)?;
                let duplicate = cart.items_of(LineItemType::Bounty).any(|item| {
                    item.purchase_data()
                        .map(|existing| {
                            existing.product_id == purchase_data.product_id
                                && existing.title == purchase_data.title
                        })
                        .unwrap_or(false)
                });
                if duplicate {
                    return Err(CommerceError::validation(format!(
                        "Bounty '{}' is already in the cart",
                        purchase_data.title
                    )));
                }

                let mut item = LineItem::new(LineItemType::Bounty, quantity);
                match purchase_data.reward_type {
                    RewardType::Usd => item.unit_price_usd_cents = purchase_data.reward_in_usd_cents,
                    RewardType::Points => item.unit_price_points = purchase_data.reward_in_points,
                }
                item.description = format!("Bounty: {}", purchase_data.title);
                item.metadata = purchase_data.to_metadata()?;

                state.cart_mut(cart_id)?.line_items.push(item.clone());
                self.recompute_totals(state, cart_id)?;
                Ok(item)
            })
            .await;

        match &result {
            Ok(item) => tracing::info!("➕ Bounty line {} added to cart {}", item.id, cart_id),
            Err(e) => tracing::warn!("⚠️ Cannot add bounty to cart {}: {}", cart_id, e),
        }
        result
    }

    /// 付費點數申請以 POINT_GRANT 項目結帳
    pub async fn add_point_grant_request(&self, cart_id: Id, request_id: Id) -> Result<LineItem> {
        let result = self
            .store
            .atomic(|state| {
                ensure_mutable(state, cart_id)?;

                let cart = state.cart(cart_id)?;
                let request = state.point_grant_request(request_id)?;
                if request.organisation_id != cart.organisation_id {
                    return Err(CommerceError::validation(
                        "Point grant request belongs to another organisation",
                    ));
                }
                if request.grant_type != GrantType::Paid {
                    return Err(CommerceError::validation(
                        "Only paid point grant requests can be purchased",
                    ));
                }
                if request.status != GrantRequestStatus::Pending {
                    return Err(CommerceError::invalid_state(
                        "PointGrantRequest",
                        request_id,
                        GrantRequestStatus::Pending,
                        request.status,
                    ));
                }
                if cart
                    .items_of(LineItemType::PointGrant)
                    .any(|item| item.point_grant_request_id == Some(request_id))
                {
                    return Err(CommerceError::validation(
                        "Point grant request is already in the cart",
                    ));
                }

                let price = request
                    .number_of_points
                    .checked_mul(self.point_price_cents)
                    .ok_or_else(|| CommerceError::overflow("point grant price"))?;

                let mut item = LineItem::new(LineItemType::PointGrant, 1);
                item.unit_price_usd_cents = Some(price);
                item.description = format!("Point grant: {} points", request.number_of_points);
                item.point_grant_request_id = Some(request_id);

                state.cart_mut(cart_id)?.line_items.push(item.clone());
                self.recompute_totals(state, cart_id)?;
                Ok(item)
            })
            .await;

        match &result {
            Ok(item) => tracing::info!("➕ Point grant line {} added to cart {}", item.id, cart_id),
            Err(e) => tracing::warn!("⚠️ Cannot add point grant to cart {}: {}", cart_id, e),
        }
        result
    }

    pub async fn remove_item(&self, cart_id: Id, line_item_id: Id) -> Result<()> {
        self.store
            .atomic(|state| {
                ensure_mutable(state, cart_id)?;

                let cart = state.cart_mut(cart_id)?;
                let position = cart
                    .line_items
                    .iter()
                    .position(|item| item.id == line_item_id)
                    .ok_or_else(|| CommerceError::not_found("LineItem", line_item_id))?;

                // 手續費與稅金由系統維護
                if !cart.line_items[position].is_purchasable() {
                    return Err(CommerceError::validation(format!(
                        "{} lines cannot be removed",
                        cart.line_items[position].item_type
                    )));
                }

                cart.line_items.remove(position);
                self.recompute_totals(state, cart_id)
            })
            .await?;

        tracing::info!("➖ Line {} removed from cart {}", line_item_id, cart_id);
        Ok(())
    }

    pub async fn update_totals(&self, cart_id: Id) -> Result<Cart> {
        self.store
            .atomic(|state| {
                ensure_mutable(state, cart_id)?;
                self.recompute_totals(state, cart_id)?;
                state.cart(cart_id).cloned()
            })
            .await
    }

    /// 回傳所有驗證錯誤，空的代表可以結帳
    pub async fn validate(&self, cart_id: Id) -> Result<Vec<String>> {
        let errors = self
            .store
            .read(|state| Ok(validation_errors(state, state.cart(cart_id)?)))
            .await?;

        if !errors.is_empty() {
            tracing::warn!("⚠️ Cart {} failed validation: {}", cart_id, errors.join("; "));
        }
        Ok(errors)
    }

    pub async fn abandon(&self, cart_id: Id) -> Result<()> {
        self.store
            .atomic(|state| {
                ensure_mutable(state, cart_id)?;
                let cart = state.cart_mut(cart_id)?;
                cart.status = CartStatus::Abandoned;
                cart.updated_at = Utc::now();
                Ok(())
            })
            .await?;

        tracing::info!("🗑️ Cart {} abandoned", cart_id);
        Ok(())
    }

    /// 依目前的項目重算手續費、稅金與總額
    fn recompute_totals(&self, state: &mut CommerceState, cart_id: Id) -> Result<()> {
        let country = {
            let cart = state.cart(cart_id)?;
            state.organisation(cart.organisation_id)?.country.clone()
        };
        let cart = state.cart_mut(cart_id)?;

        let mut base = 0u64;
        let mut points = 0u64;
        let mut increase = 0u64;
        let mut decrease = 0u64;
        for item in &cart.line_items {
            match item.item_type {
                LineItemType::Bounty => {
                    base = checked_add(base, item.total_price_usd_cents()?, "cart base total")?;
                    points = checked_add(points, item.total_price_points()?, "cart points total")?;
                }
                LineItemType::PointGrant => {
                    base = checked_add(base, item.total_price_usd_cents()?, "cart base total")?;
                }
                LineItemType::IncreaseAdjustment => {
                    increase = checked_add(increase, item.total_price_usd_cents()?, "adjustments")?;
                }
                LineItemType::DecreaseAdjustment => {
                    decrease = checked_add(decrease, item.total_price_usd_cents()?, "adjustments")?;
                }
                LineItemType::PlatformFee | LineItemType::SalesTax => {}
            }
        }

        let fee = self.fees.calculate_platform_fee(base)?;
        let tax = self.taxes.calculate_tax(base, &country)?;
        upsert_charge(cart, LineItemType::PlatformFee, fee, "Platform fee".to_string());
        upsert_charge(cart, LineItemType::SalesTax, tax, format!("Sales tax ({})", country));

        let total = checked_add(checked_add(base, fee, "cart total")?, tax, "cart total")?;
        let total = checked_add(total, increase, "cart total")?.saturating_sub(decrease);

        cart.total_usd_cents_excluding_fees_and_taxes = base;
        cart.total_usd_cents_including_fees_and_taxes = total;
        cart.total_points = points;
        cart.updated_at = Utc::now();

        tracing::debug!(
            "🧮 Cart {} totals: base={} fee={} tax={} total={} points={}",
            cart_id,
            base,
            fee,
            tax,
            total,
            points
        );
        Ok(())
    }
}

/// 購物車必須存在、仍是 OPEN，而且尚未建立訂單
pub(crate) fn ensure_mutable(state: &CommerceState, cart_id: Id) -> Result<()> {
    let cart = state.cart(cart_id)?;
    if cart.status != CartStatus::Open {
        return Err(CommerceError::invalid_state(
            "Cart",
            cart_id,
            CartStatus::Open,
            cart.status,
        ));
    }
    if let Some(order) = state.order_for_cart(cart_id) {
        return Err(CommerceError::validation(format!(
            "Cart is locked by sales order {}",
            order.id
        )));
    }
    Ok(())
}

pub fn validation_errors(state: &CommerceState, cart: &Cart) -> Vec<String> {
    let mut errors = Vec::new();

    if cart.status != CartStatus::Open {
        errors.push("Cart is not open".to_string());
    }
    if !cart.line_items.iter().any(LineItem::is_purchasable) {
        errors.push("Cart has no items".to_string());
    }
    for item in cart.line_items.iter().filter(|item| item.is_purchasable()) {
        if item.quantity == 0 {
            errors.push(format!("Invalid quantity for line item {}", item.id));
        }
    }
    if cart.total_usd_cents_including_fees_and_taxes == 0 && cart.total_points == 0 {
        errors.push("Cart total must be greater than zero".to_string());
    }
    for item in cart.items_of(LineItemType::PointGrant) {
        let pending = item
            .point_grant_request_id
            .and_then(|id| state.point_grant_requests.get(&id))
            .map(|request| request.status == GrantRequestStatus::Pending)
            .unwrap_or(false);
        if !pending {
            errors.push(format!(
                "Point grant request for line item {} is no longer pending",
                item.id
            ));
        }
    }

    errors
}

fn upsert_charge(cart: &mut Cart, item_type: LineItemType, amount: u64, description: String) {
    match cart
        .line_items
        .iter_mut()
        .find(|item| item.item_type == item_type)
    {
        Some(item) => {
            item.unit_price_usd_cents = Some(amount);
            item.description = description;
        }
        None => {
            let mut item = LineItem::new(item_type, 1);
            item.unit_price_usd_cents = Some(amount);
            item.description = description;
            cart.line_items.push(item);
        }
    }
}
