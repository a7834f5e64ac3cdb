use crate::core::payment::PaymentService;
use crate::core::pricing::checked_add;
use crate::domain::model::{
    CommerceState, ContributorTransactionType, ContributorWallet, ContributorWalletTransaction, Id,
    OrganisationWallet, PaymentMethod, TransactionStatus, WalletTransaction,
    WalletTransactionType,
};
use crate::domain::ports::{PaymentDetails, Store};
use crate::utils::error::{CommerceError, Result};
use crate::utils::validation::validate_positive_amount;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// 取得組織錢包，不存在時建立一個空錢包
pub fn ensure_organisation_wallet(
    state: &mut CommerceState,
    organisation_id: Id,
) -> Result<&mut OrganisationWallet> {
    state.organisation(organisation_id)?;
    Ok(state
        .wallets
        .entry(organisation_id)
        .or_insert_with(|| OrganisationWallet {
            id: Uuid::new_v4(),
            organisation_id,
            balance_usd_cents: 0,
            updated_at: Utc::now(),
        }))
}

pub fn credit_organisation(
    state: &mut CommerceState,
    organisation_id: Id,
    amount_cents: u64,
    description: &str,
    payment_method: Option<PaymentMethod>,
    transaction_id: Option<String>,
    related_order_id: Option<Id>,
) -> Result<WalletTransaction> {
    validate_positive_amount("amount_cents", amount_cents)?;

    let wallet = ensure_organisation_wallet(state, organisation_id)?;
    wallet.balance_usd_cents = checked_add(wallet.balance_usd_cents, amount_cents, "wallet balance")?;
    wallet.updated_at = Utc::now();

    let transaction = WalletTransaction {
        id: Uuid::new_v4(),
        wallet_id: wallet.id,
        amount_cents,
        transaction_type: WalletTransactionType::Credit,
        description: description.to_string(),
        payment_method,
        transaction_id,
        related_order_id,
        created_at: Utc::now(),
    };
    state.wallet_transactions.push(transaction.clone());
    Ok(transaction)
}

pub fn debit_organisation(
    state: &mut CommerceState,
    organisation_id: Id,
    amount_cents: u64,
    description: &str,
    related_order_id: Option<Id>,
) -> Result<WalletTransaction> {
    validate_positive_amount("amount_cents", amount_cents)?;

    let wallet = state.wallet_mut(organisation_id)?;
    if wallet.balance_usd_cents < amount_cents {
        return Err(CommerceError::InsufficientFunds {
            needed: amount_cents,
            available: wallet.balance_usd_cents,
        });
    }
    wallet.balance_usd_cents -= amount_cents;
    wallet.updated_at = Utc::now();

    let transaction = WalletTransaction {
        id: Uuid::new_v4(),
        wallet_id: wallet.id,
        amount_cents,
        transaction_type: WalletTransactionType::Debit,
        description: description.to_string(),
        payment_method: None,
        transaction_id: None,
        related_order_id,
        created_at: Utc::now(),
    };
    state.wallet_transactions.push(transaction.clone());
    Ok(transaction)
}

/// 把獎金撥入貢獻者錢包（已完成的 CREDIT）
pub fn credit_contributor(
    state: &mut CommerceState,
    contributor_id: Id,
    amount_cents: u64,
    description: &str,
    bounty_id: Option<Id>,
) -> Result<ContributorWalletTransaction> {
    validate_positive_amount("amount_cents", amount_cents)?;

    let wallet = state
        .contributor_wallets
        .entry(contributor_id)
        .or_insert_with(|| ContributorWallet {
            id: Uuid::new_v4(),
            contributor_id,
            balance_usd_cents: 0,
            updated_at: Utc::now(),
        });
    wallet.balance_usd_cents = checked_add(wallet.balance_usd_cents, amount_cents, "contributor balance")?;
    wallet.updated_at = Utc::now();

    let transaction = ContributorWalletTransaction {
        id: Uuid::new_v4(),
        wallet_id: wallet.id,
        amount_cents,
        transaction_type: ContributorTransactionType::Credit,
        description: description.to_string(),
        status: TransactionStatus::Completed,
        payment_method: None,
        transaction_id: None,
        bounty_id,
        created_at: Utc::now(),
    };
    state.contributor_wallet_transactions.push(transaction.clone());
    Ok(transaction)
}

pub struct WalletService<S: Store> {
    store: Arc<S>,
    payments: Arc<PaymentService>,
    min_withdrawal_cents: u64,
    max_withdrawal_cents: u64,
}

impl<S: Store> WalletService<S> {
    pub fn new(
        store: Arc<S>,
        payments: Arc<PaymentService>,
        min_withdrawal_cents: u64,
        max_withdrawal_cents: u64,
    ) -> Self {
        Self {
            store,
            payments,
            min_withdrawal_cents,
            max_withdrawal_cents,
        }
    }

    pub async fn add_funds(
        &self,
        organisation_id: Id,
        amount_cents: u64,
        description: &str,
        payment_method: Option<PaymentMethod>,
        transaction_id: Option<String>,
    ) -> Result<WalletTransaction> {
        let transaction = self
            .store
            .atomic(|state| {
                credit_organisation(
                    state,
                    organisation_id,
                    amount_cents,
                    description,
                    payment_method,
                    transaction_id,
                    None,
                )
            })
            .await?;

        tracing::info!("💰 Wallet of {} credited {} cents", organisation_id, amount_cents);
        Ok(transaction)
    }

    /// 透過外部付款儲值
    pub async fn deposit(
        &self,
        organisation_id: Id,
        amount_cents: u64,
        method: PaymentMethod,
        details: &PaymentDetails,
    ) -> Result<WalletTransaction> {
        validate_positive_amount("amount_cents", amount_cents)?;
        self.store.read(|state| state.organisation(organisation_id).map(|_| ())).await?;

        let receipt = self.payments.charge(method, amount_cents, details).await?;
        let description = format!("Deposit via {}", method);
        let result = self
            .add_funds(
                organisation_id,
                amount_cents,
                &description,
                Some(method),
                Some(receipt.transaction_id.clone()),
            )
            .await;

        if let Err(e) = &result {
            tracing::error!("❌ Deposit commit failed, refunding {}: {}", receipt.transaction_id, e);
            if let Err(refund_error) = self
                .payments
                .refund(method, &receipt.transaction_id, amount_cents, "deposit failed")
                .await
            {
                tracing::error!("❌ Refund of {} failed: {}", receipt.transaction_id, refund_error);
            }
        }
        result
    }

    pub async fn deduct_funds(
        &self,
        organisation_id: Id,
        amount_cents: u64,
        description: &str,
        order_id: Option<Id>,
    ) -> Result<WalletTransaction> {
        let result = self
            .store
            .atomic(|state| debit_organisation(state, organisation_id, amount_cents, description, order_id))
            .await;

        match &result {
            Ok(_) => tracing::info!("💸 Wallet of {} debited {} cents", organisation_id, amount_cents),
            Err(e) => tracing::warn!("⚠️ Cannot debit wallet of {}: {}", organisation_id, e),
        }
        result
    }

    /// 沒有錢包時餘額為 0
    pub async fn get_balance(&self, organisation_id: Id) -> Result<u64> {
        self.store
            .read(|state| {
                state.organisation(organisation_id)?;
                Ok(state
                    .wallets
                    .get(&organisation_id)
                    .map(|wallet| wallet.balance_usd_cents)
                    .unwrap_or(0))
            })
            .await
    }

    pub async fn transactions(&self, organisation_id: Id) -> Result<Vec<WalletTransaction>> {
        self.store
            .read(|state| {
                let Some(wallet) = state.wallets.get(&organisation_id) else {
                    return Ok(Vec::new());
                };
                Ok(state
                    .transactions_for_wallet(wallet.id)
                    .into_iter()
                    .cloned()
                    .collect())
            })
            .await
    }

    pub async fn add_contributor_funds(
        &self,
        contributor_id: Id,
        amount_cents: u64,
        description: &str,
    ) -> Result<ContributorWalletTransaction> {
        self.store
            .atomic(|state| credit_contributor(state, contributor_id, amount_cents, description, None))
            .await
    }

    pub async fn contributor_balance(&self, contributor_id: Id) -> Result<u64> {
        self.store
            .read(|state| {
                Ok(state
                    .contributor_wallets
                    .get(&contributor_id)
                    .map(|wallet| wallet.balance_usd_cents)
                    .unwrap_or(0))
            })
            .await
    }

    /// 提領：先扣款並記錄 PENDING，付款成功後 COMPLETED，失敗則退回餘額並標記 FAILED
    pub async fn process_withdrawal(
        &self,
        contributor_id: Id,
        amount_cents: u64,
        method: PaymentMethod,
        details: &PaymentDetails,
    ) -> Result<ContributorWalletTransaction> {
        if amount_cents < self.min_withdrawal_cents || amount_cents > self.max_withdrawal_cents {
            tracing::warn!("⚠️ Withdrawal of {} cents outside limits", amount_cents);
            return Err(CommerceError::validation(format!(
                "Withdrawal amount must be between {} and {} cents",
                self.min_withdrawal_cents, self.max_withdrawal_cents
            )));
        }

        let gateway = self.payments.gateway(method)?;
        gateway.validate_details(details)?;

        let pending = self
            .store
            .atomic(|state| {
                let wallet = state
                    .contributor_wallets
                    .get_mut(&contributor_id)
                    .ok_or_else(|| CommerceError::not_found("ContributorWallet", contributor_id))?;
                if wallet.balance_usd_cents < amount_cents {
                    return Err(CommerceError::InsufficientFunds {
                        needed: amount_cents,
                        available: wallet.balance_usd_cents,
                    });
                }
                wallet.balance_usd_cents -= amount_cents;
                wallet.updated_at = Utc::now();

                let transaction = ContributorWalletTransaction {
                    id: Uuid::new_v4(),
                    wallet_id: wallet.id,
                    amount_cents,
                    transaction_type: ContributorTransactionType::Withdrawal,
                    description: format!("{} withdrawal", method),
                    status: TransactionStatus::Pending,
                    payment_method: Some(method),
                    transaction_id: None,
                    bounty_id: None,
                    created_at: Utc::now(),
                };
                state.contributor_wallet_transactions.push(transaction.clone());
                Ok(transaction)
            })
            .await?;

        let payout = gateway.payout(amount_cents, details).await;

        let (status, transaction_id) = match &payout {
            Ok(receipt) => (TransactionStatus::Completed, Some(receipt.transaction_id.clone())),
            Err(_) => (TransactionStatus::Failed, None),
        };

        let finished = self
            .store
            .atomic(|state| {
                if status == TransactionStatus::Failed {
                    let wallet = state
                        .contributor_wallets
                        .get_mut(&contributor_id)
                        .ok_or_else(|| CommerceError::not_found("ContributorWallet", contributor_id))?;
                    wallet.balance_usd_cents =
                        checked_add(wallet.balance_usd_cents, amount_cents, "contributor balance")?;
                    wallet.updated_at = Utc::now();
                }

                let transaction = state
                    .contributor_wallet_transactions
                    .iter_mut()
                    .find(|tx| tx.id == pending.id)
                    .ok_or_else(|| CommerceError::not_found("ContributorWalletTransaction", pending.id))?;
                transaction.status = status;
                transaction.transaction_id = transaction_id;
                Ok(transaction.clone())
            })
            .await?;

        match payout {
            Ok(_) => {
                tracing::info!("🏧 Withdrawal {} of {} cents completed", finished.id, amount_cents);
                Ok(finished)
            }
            Err(e) => {
                tracing::error!("❌ Withdrawal {} failed: {}", finished.id, e);
                Err(e)
            }
        }
    }
}
