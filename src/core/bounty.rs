use crate::core::{points, wallet};
use crate::domain::model::{
    validate_reward, Bounty, BountyPurchaseData, BountyStatus, CommerceState, Id, RewardType,
};
use crate::domain::ports::Store;
use crate::utils::error::{CommerceError, Result};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// 由已付款的購物快照建立 FUNDED bounty，獎勵欄位原樣複製
pub fn create_from_purchase(
    state: &mut CommerceState,
    data: &BountyPurchaseData,
    sales_order_id: Id,
) -> Result<Bounty> {
    data.validate()?;

    let now = Utc::now();
    let bounty = Bounty {
        id: Uuid::new_v4(),
        product_id: data.product_id.clone(),
        challenge_id: data.challenge_id.clone(),
        competition_id: data.competition_id.clone(),
        title: data.title.clone(),
        description: data.description.clone(),
        status: BountyStatus::Funded,
        reward_type: data.reward_type,
        reward_in_usd_cents: data.reward_in_usd_cents,
        reward_in_points: data.reward_in_points,
        final_reward_in_usd_cents: None,
        final_reward_in_points: None,
        skill_id: data.skill_id.clone(),
        expertise_ids: data.expertise_ids.clone(),
        claimant_id: None,
        sales_order_id: Some(sales_order_id),
        created_at: now,
        updated_at: now,
    };
    state.bounties.insert(bounty.id, bounty.clone());
    Ok(bounty)
}

fn transition(state: &mut CommerceState, bounty_id: Id, next: BountyStatus) -> Result<&mut Bounty> {
    let bounty = state.bounty_mut(bounty_id)?;
    if !bounty.status.can_transition_to(next) {
        return Err(CommerceError::invalid_state(
            "Bounty",
            bounty_id,
            format!("a status that can move to {}", next),
            bounty.status,
        ));
    }
    bounty.status = next;
    bounty.updated_at = Utc::now();
    Ok(bounty)
}

pub struct BountyService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> BountyService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn get(&self, bounty_id: Id) -> Result<Bounty> {
        self.store.read(|state| state.bounty(bounty_id).cloned()).await
    }

    pub async fn for_order(&self, sales_order_id: Id) -> Result<Vec<Bounty>> {
        self.store
            .read(|state| {
                Ok(state
                    .bounties
                    .values()
                    .filter(|bounty| bounty.sales_order_id == Some(sales_order_id))
                    .cloned()
                    .collect())
            })
            .await
    }

    /// 一般的狀態變更。完成要走 `complete`（會撥付獎勵），認領要走 `claim`（會記錄認領者）；
    /// 只有 IN_REVIEW 退回 CLAIMED 可以在這裡做。
    pub async fn update_status(&self, bounty_id: Id, new_status: BountyStatus) -> Result<Bounty> {
        let result = self
            .store
            .atomic(|state| {
                match new_status {
                    BountyStatus::Completed => {
                        return Err(CommerceError::validation(
                            "Bounties are completed through complete() so the reward is paid",
                        ));
                    }
                    BountyStatus::Claimed if state.bounty(bounty_id)?.claimant_id.is_none() => {
                        return Err(CommerceError::validation(
                            "Bounties are claimed through claim() with a contributor",
                        ));
                    }
                    _ => {}
                }

                let bounty = transition(state, bounty_id, new_status)?;
                // 回到 OPEN 代表認領者放棄
                if new_status == BountyStatus::Open {
                    bounty.claimant_id = None;
                }
                Ok(bounty.clone())
            })
            .await;

        match &result {
            Ok(_) => tracing::info!("🔄 Bounty {} -> {}", bounty_id, new_status),
            Err(e) => tracing::warn!("⚠️ Bounty {} cannot move to {}: {}", bounty_id, new_status, e),
        }
        result
    }

    pub async fn claim(&self, bounty_id: Id, contributor_id: Id) -> Result<Bounty> {
        let bounty = self
            .store
            .atomic(|state| {
                let bounty = transition(state, bounty_id, BountyStatus::Claimed)?;
                bounty.claimant_id = Some(contributor_id);
                Ok(bounty.clone())
            })
            .await?;

        tracing::info!("🙋 Bounty {} claimed by {}", bounty_id, contributor_id);
        Ok(bounty)
    }

    /// IN_REVIEW -> COMPLETED，並把最終獎勵（沒有設定時用原本的獎勵）撥給認領者
    pub async fn complete(&self, bounty_id: Id) -> Result<Bounty> {
        let bounty = self
            .store
            .atomic(|state| {
                let bounty = transition(state, bounty_id, BountyStatus::Completed)?;
                let claimant = bounty.claimant_id.ok_or_else(|| {
                    CommerceError::validation(format!("Bounty {} has no claimant", bounty_id))
                })?;

                let reward_usd = bounty.final_reward_in_usd_cents.or(bounty.reward_in_usd_cents);
                let reward_points = bounty.final_reward_in_points.or(bounty.reward_in_points);
                bounty.final_reward_in_usd_cents = reward_usd;
                bounty.final_reward_in_points = reward_points;
                let reward_type = bounty.reward_type;
                let description = format!("Reward for bounty '{}'", bounty.title);
                let completed = bounty.clone();

                match reward_type {
                    RewardType::Usd => {
                        let amount = reward_usd.unwrap_or(0);
                        wallet::credit_contributor(state, claimant, amount, &description, Some(bounty_id))?;
                    }
                    RewardType::Points => {
                        let amount = reward_points.unwrap_or(0);
                        points::credit_contributor_points(state, claimant, amount, &description)?;
                    }
                }
                Ok(completed)
            })
            .await?;

        tracing::info!("🏆 Bounty {} completed", bounty_id);
        Ok(bounty)
    }

    /// 覆寫最終獎勵，需要在完成之前設定
    pub async fn set_final_reward(
        &self,
        bounty_id: Id,
        final_usd_cents: Option<u64>,
        final_points: Option<u64>,
    ) -> Result<Bounty> {
        self.store
            .atomic(|state| {
                let bounty = state.bounty_mut(bounty_id)?;
                if matches!(bounty.status, BountyStatus::Completed | BountyStatus::Cancelled) {
                    return Err(CommerceError::invalid_state(
                        "Bounty",
                        bounty_id,
                        "an unfinished status",
                        bounty.status,
                    ));
                }
                validate_reward(bounty.reward_type, final_usd_cents, final_points)?;
                bounty.final_reward_in_usd_cents = final_usd_cents;
                bounty.final_reward_in_points = final_points;
                bounty.updated_at = Utc::now();
                Ok(bounty.clone())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_store::MemoryStore;

    async fn funded(store: &Arc<MemoryStore>, data: BountyPurchaseData) -> Bounty {
        store
            .atomic(move |state| create_from_purchase(state, &data, Uuid::new_v4()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_from_purchase_copies_reward() {
        let store = Arc::new(MemoryStore::new());
        let data = BountyPurchaseData::usd("product-1", "Fix login", 7_500).with_challenge("challenge-1");
        let bounty = funded(&store, data).await;

        assert_eq!(bounty.status, BountyStatus::Funded);
        assert_eq!(bounty.reward_in_usd_cents, Some(7_500));
        assert_eq!(bounty.reward_in_points, None);
        assert_eq!(bounty.challenge_id.as_deref(), Some("challenge-1"));
    }

    #[tokio::test]
    async fn test_lifecycle_and_usd_payout() {
        let store = Arc::new(MemoryStore::new());
        let service = BountyService::new(store.clone());
        let bounty = funded(&store, BountyPurchaseData::usd("product-1", "Task", 5_000)).await;
        let contributor = Uuid::new_v4();

        // FUNDED 不能直接認領
        assert!(service.claim(bounty.id, contributor).await.is_err());

        service.update_status(bounty.id, BountyStatus::Open).await.unwrap();
        service.claim(bounty.id, contributor).await.unwrap();
        service.update_status(bounty.id, BountyStatus::InReview).await.unwrap();
        let done = service.complete(bounty.id).await.unwrap();

        assert_eq!(done.status, BountyStatus::Completed);
        assert_eq!(done.final_reward_in_usd_cents, Some(5_000));
        let balance = store
            .read(move |state| Ok(state.contributor_wallets[&contributor].balance_usd_cents))
            .await
            .unwrap();
        assert_eq!(balance, 5_000);
    }

    #[tokio::test]
    async fn test_points_bounty_pays_final_reward_in_points() {
        let store = Arc::new(MemoryStore::new());
        let service = BountyService::new(store.clone());
        let bounty = funded(&store, BountyPurchaseData::points("product-1", "Docs", 300)).await;
        let contributor = Uuid::new_v4();

        service.update_status(bounty.id, BountyStatus::Open).await.unwrap();
        service.claim(bounty.id, contributor).await.unwrap();
        service.set_final_reward(bounty.id, None, Some(250)).await.unwrap();
        service.update_status(bounty.id, BountyStatus::InReview).await.unwrap();
        service.complete(bounty.id).await.unwrap();

        let points = store
            .read(move |state| Ok(state.contributor_point_accounts[&contributor].balance))
            .await
            .unwrap();
        assert_eq!(points, 250);
    }

    #[tokio::test]
    async fn test_unclaim_and_cancel() {
        let store = Arc::new(MemoryStore::new());
        let service = BountyService::new(store.clone());
        let bounty = funded(&store, BountyPurchaseData::usd("product-1", "Task", 1_000)).await;

        service.update_status(bounty.id, BountyStatus::Open).await.unwrap();
        service.claim(bounty.id, Uuid::new_v4()).await.unwrap();
        let reopened = service.update_status(bounty.id, BountyStatus::Open).await.unwrap();
        assert!(reopened.claimant_id.is_none());

        service.update_status(bounty.id, BountyStatus::Cancelled).await.unwrap();
        assert!(service.update_status(bounty.id, BountyStatus::Open).await.is_err());
    }

    #[tokio::test]
    async fn test_update_status_cannot_skip_payout_or_claimant() {
        let store = Arc::new(MemoryStore::new());
        let service = BountyService::new(store.clone());
        let bounty = funded(&store, BountyPurchaseData::usd("product-1", "Task", 2_000)).await;
        let contributor = Uuid::new_v4();

        service.update_status(bounty.id, BountyStatus::Open).await.unwrap();
        assert!(service.update_status(bounty.id, BountyStatus::Claimed).await.is_err());

        service.claim(bounty.id, contributor).await.unwrap();
        service.update_status(bounty.id, BountyStatus::InReview).await.unwrap();
        assert!(service.update_status(bounty.id, BountyStatus::Completed).await.is_err());
        assert_eq!(service.get(bounty.id).await.unwrap().status, BountyStatus::InReview);

        // 審查退回時保留認領者
        let back = service.update_status(bounty.id, BountyStatus::Claimed).await.unwrap();
        assert_eq!(back.claimant_id, Some(contributor));

        service.update_status(bounty.id, BountyStatus::InReview).await.unwrap();
        service.complete(bounty.id).await.unwrap();
        let balance = store
            .read(move |state| Ok(state.contributor_wallets[&contributor].balance_usd_cents))
            .await
            .unwrap();
        assert_eq!(balance, 2_000);
    }
}
