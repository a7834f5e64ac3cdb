use crate::core::pricing::checked_add;
use crate::domain::model::{
    CartStatus, CommerceState, GrantRequestStatus, GrantType, Id, LineItemType, OrderStatus,
    PointAccount, PointGrant, PointGrantRequest, PointTransaction, PointTransactionType,
};
use crate::domain::ports::Store;
use crate::utils::error::{CommerceError, Result};
use crate::utils::validation::validate_positive_amount;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

fn organisation_account(state: &mut CommerceState, organisation_id: Id) -> Result<&mut PointAccount> {
    state.organisation(organisation_id)?;
    Ok(state
        .organisation_point_accounts
        .entry(organisation_id)
        .or_insert_with(|| PointAccount::new(organisation_id)))
}

fn record(
    state: &mut CommerceState,
    account_id: Id,
    amount: u64,
    transaction_type: PointTransactionType,
    description: &str,
    related_order_id: Option<Id>,
) {
    state.point_transactions.push(PointTransaction {
        id: Uuid::new_v4(),
        account_id,
        amount,
        transaction_type,
        description: description.to_string(),
        related_order_id,
        created_at: Utc::now(),
    });
}

/// 增加組織點數（GRANT 或 REFUND）
pub fn credit_organisation_points(
    state: &mut CommerceState,
    organisation_id: Id,
    amount: u64,
    transaction_type: PointTransactionType,
    description: &str,
    related_order_id: Option<Id>,
) -> Result<()> {
    validate_positive_amount("points", amount)?;

    let account = organisation_account(state, organisation_id)?;
    account.balance = checked_add(account.balance, amount, "point balance")?;
    let account_id = account.id;

    record(state, account_id, amount, transaction_type, description, related_order_id);
    Ok(())
}

/// 扣除組織點數（USE）
pub fn debit_organisation_points(
    state: &mut CommerceState,
    organisation_id: Id,
    amount: u64,
    description: &str,
    related_order_id: Option<Id>,
) -> Result<()> {
    debit(
        state,
        organisation_id,
        amount,
        PointTransactionType::Use,
        description,
        related_order_id,
    )
}

fn debit(
    state: &mut CommerceState,
    organisation_id: Id,
    amount: u64,
    transaction_type: PointTransactionType,
    description: &str,
    related_order_id: Option<Id>,
) -> Result<()> {
    validate_positive_amount("points", amount)?;

    let account = organisation_account(state, organisation_id)?;
    if account.balance < amount {
        return Err(CommerceError::InsufficientPoints {
            needed: amount,
            available: account.balance,
        });
    }
    account.balance -= amount;
    let account_id = account.id;

    record(state, account_id, amount, transaction_type, description, related_order_id);
    Ok(())
}

/// 貢獻者賺取點數（EARN）
pub fn credit_contributor_points(
    state: &mut CommerceState,
    contributor_id: Id,
    amount: u64,
    description: &str,
) -> Result<()> {
    validate_positive_amount("points", amount)?;

    let account = state
        .contributor_point_accounts
        .entry(contributor_id)
        .or_insert_with(|| PointAccount::new(contributor_id));
    account.balance = checked_add(account.balance, amount, "point balance")?;
    let account_id = account.id;

    record(state, account_id, amount, PointTransactionType::Earn, description, None);
    Ok(())
}

pub fn create_grant(
    state: &mut CommerceState,
    organisation_id: Id,
    amount: u64,
    granted_by: Option<Id>,
    rationale: &str,
    grant_request_id: Option<Id>,
    sales_order_line_item_id: Option<Id>,
) -> Result<PointGrant> {
    credit_organisation_points(
        state,
        organisation_id,
        amount,
        PointTransactionType::Grant,
        rationale,
        None,
    )?;

    let grant = PointGrant {
        id: Uuid::new_v4(),
        organisation_id,
        amount,
        granted_by,
        rationale: rationale.to_string(),
        grant_request_id,
        sales_order_line_item_id,
        created_at: Utc::now(),
    };
    state.point_grants.insert(grant.id, grant.clone());
    Ok(grant)
}

/// 已付款的點數申請：核准申請並發放點數。同一個訂單項目只會發放一次。
pub fn process_paid_grant(
    state: &mut CommerceState,
    request_id: Id,
    line_item_id: Id,
) -> Result<PointGrant> {
    if let Some(existing) = state
        .point_grants
        .values()
        .find(|grant| grant.sales_order_line_item_id == Some(line_item_id))
    {
        return Ok(existing.clone());
    }

    let request = state.point_grant_request(request_id)?.clone();
    if request.grant_type != GrantType::Paid {
        return Err(CommerceError::validation(format!(
            "Point grant request {} is not a paid request",
            request_id
        )));
    }
    if request.status != GrantRequestStatus::Pending {
        return Err(CommerceError::invalid_state(
            "PointGrantRequest",
            request_id,
            GrantRequestStatus::Pending,
            request.status,
        ));
    }

    let grant = create_grant(
        state,
        request.organisation_id,
        request.number_of_points,
        request.requested_by,
        &request.rationale,
        Some(request_id),
        Some(line_item_id),
    )?;

    if let Some(request) = state.point_grant_requests.get_mut(&request_id) {
        request.status = GrantRequestStatus::Approved;
    }
    Ok(grant)
}

/// 退款時收回訂單項目發放的點數（REFUND）。點數已經用掉時失敗。
/// 回傳收回的點數，該項目沒有發放過點數時回傳 None。
pub fn reverse_paid_grant(
    state: &mut CommerceState,
    line_item_id: Id,
    order_id: Id,
) -> Result<Option<u64>> {
    let Some(grant) = state
        .point_grants
        .values()
        .find(|grant| grant.sales_order_line_item_id == Some(line_item_id))
        .cloned()
    else {
        return Ok(None);
    };

    debit(
        state,
        grant.organisation_id,
        grant.amount,
        PointTransactionType::Refund,
        &format!("Reversal of point grant {} for order {}", grant.id, order_id),
        Some(order_id),
    )?;
    Ok(Some(grant.amount))
}

/// 撤銷 `reverse_paid_grant`：退款沒有完成時把收回的點數發回去
pub fn restore_paid_grant(
    state: &mut CommerceState,
    line_item_id: Id,
    order_id: Id,
) -> Result<Option<u64>> {
    let Some(grant) = state
        .point_grants
        .values()
        .find(|grant| grant.sales_order_line_item_id == Some(line_item_id))
        .cloned()
    else {
        return Ok(None);
    };

    credit_organisation_points(
        state,
        grant.organisation_id,
        grant.amount,
        PointTransactionType::Grant,
        &format!("Restored point grant {} for order {}", grant.id, order_id),
        Some(order_id),
    )?;
    Ok(Some(grant.amount))
}

/// 申請是否已放進仍在進行中的購物車或訂單
pub fn request_in_checkout(state: &CommerceState, request_id: Id) -> bool {
    let in_cart = state
        .carts
        .values()
        .filter(|cart| cart.status == CartStatus::Open)
        .flat_map(|cart| cart.items_of(LineItemType::PointGrant))
        .any(|item| item.point_grant_request_id == Some(request_id));
    let in_order = state
        .sales_orders
        .values()
        .filter(|order| {
            matches!(
                order.status,
                OrderStatus::Pending | OrderStatus::Paid | OrderStatus::Refunding
            )
        })
        .flat_map(|order| order.items_of(LineItemType::PointGrant))
        .any(|item| item.point_grant_request_id == Some(request_id));
    in_cart || in_order
}

pub struct PointsService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> PointsService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn balance(&self, organisation_id: Id) -> Result<u64> {
        self.store
            .read(|state| {
                state.organisation(organisation_id)?;
                Ok(state.organisation_points(organisation_id))
            })
            .await
    }

    pub async fn create_request(
        &self,
        organisation_id: Id,
        number_of_points: u64,
        grant_type: GrantType,
        rationale: &str,
        requested_by: Option<Id>,
    ) -> Result<PointGrantRequest> {
        validate_positive_amount("number_of_points", number_of_points)?;

        let request = self
            .store
            .atomic(|state| {
                state.organisation(organisation_id)?;
                let request = PointGrantRequest {
                    id: Uuid::new_v4(),
                    organisation_id,
                    number_of_points,
                    requested_by,
                    rationale: rationale.to_string(),
                    status: GrantRequestStatus::Pending,
                    grant_type,
                    created_at: Utc::now(),
                };
                state.point_grant_requests.insert(request.id, request.clone());
                Ok(request)
            })
            .await?;

        tracing::info!(
            "📝 {} point grant request {} for {} points",
            grant_type,
            request.id,
            number_of_points
        );
        Ok(request)
    }

    /// FREE 申請直接發放；PAID 申請必須透過訂單付款
    pub async fn approve_request(&self, request_id: Id, approved_by: Option<Id>) -> Result<PointGrant> {
        let grant = self
            .store
            .atomic(|state| {
                let request = state.point_grant_request(request_id)?.clone();
                if request.status != GrantRequestStatus::Pending {
                    return Err(CommerceError::invalid_state(
                        "PointGrantRequest",
                        request_id,
                        GrantRequestStatus::Pending,
                        request.status,
                    ));
                }
                if request.grant_type == GrantType::Paid {
                    return Err(CommerceError::validation(
                        "Paid point grant requests are approved through a paid sales order",
                    ));
                }

                let grant = create_grant(
                    state,
                    request.organisation_id,
                    request.number_of_points,
                    approved_by.or(request.requested_by),
                    &request.rationale,
                    Some(request_id),
                    None,
                )?;
                if let Some(request) = state.point_grant_requests.get_mut(&request_id) {
                    request.status = GrantRequestStatus::Approved;
                }
                Ok(grant)
            })
            .await?;

        tracing::info!("🎁 Point grant request {} approved ({} points)", request_id, grant.amount);
        Ok(grant)
    }

    pub async fn reject_request(&self, request_id: Id) -> Result<()> {
        self.store
            .atomic(|state| {
                let request = state.point_grant_request(request_id)?;
                if request.status != GrantRequestStatus::Pending {
                    return Err(CommerceError::invalid_state(
                        "PointGrantRequest",
                        request_id,
                        GrantRequestStatus::Pending,
                        request.status,
                    ));
                }
                if request_in_checkout(state, request_id) {
                    return Err(CommerceError::validation(format!(
                        "Point grant request {} is part of a checkout; remove it from the cart first",
                        request_id
                    )));
                }
                if let Some(request) = state.point_grant_requests.get_mut(&request_id) {
                    request.status = GrantRequestStatus::Rejected;
                }
                Ok(())
            })
            .await?;

        tracing::info!("🚫 Point grant request {} rejected", request_id);
        Ok(())
    }

    pub async fn create_grant(
        &self,
        organisation_id: Id,
        amount: u64,
        granted_by: Option<Id>,
        rationale: &str,
    ) -> Result<PointGrant> {
        let grant = self
            .store
            .atomic(|state| create_grant(state, organisation_id, amount, granted_by, rationale, None, None))
            .await?;

        tracing::info!("🎁 Granted {} points to {}", amount, organisation_id);
        Ok(grant)
    }

    pub async fn process_paid_grant(&self, request_id: Id, line_item_id: Id) -> Result<PointGrant> {
        self.store
            .atomic(|state| process_paid_grant(state, request_id, line_item_id))
            .await
    }
}
