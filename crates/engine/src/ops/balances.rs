//! Balance mutations: deposit, withdraw, transfer.
//!
//! Every mutation runs as one store transaction; either the whole effect is
//! durably visible or none of it is. Validation happens before any lock is
//! taken, sufficiency is re-checked at the write itself, and two-account
//! transfers acquire their row locks in ascending account-id order so that
//! opposing transfers over the same pair cannot deadlock.

use sea_orm::{DatabaseTransaction, QueryFilter, TransactionTrait, prelude::*, sea_query::Expr};

use crate::{
    Account, EngineError, Principal, ResultEngine, accounts, policy,
    util::{ensure_same_currency, model_currency},
};

use super::{Engine, access::require_account_visible, retry_contention, validate_amount, with_tx};

impl Engine {
    /// Return one account snapshot, owner only.
    ///
    /// Display path: a plain read, no row lock.
    pub async fn account(&self, principal: &Principal, account_id: i64) -> ResultEngine<Account> {
        policy::require_regular(principal)?;
        let model = self
            .find_account(&self.database, account_id)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("account not exists".to_string()))?;
        let model = require_account_visible(model, principal)?;
        Account::try_from(model)
    }

    /// Return every account owned by the principal, ordered by id.
    pub async fn accounts_for(&self, principal: &Principal) -> ResultEngine<Vec<Account>> {
        policy::require_regular(principal)?;
        self.accounts_by_owner(&self.database, principal.user_id)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    /// Atomically increment an account balance by `amount_minor`.
    ///
    /// Returns the post-update snapshot.
    pub async fn deposit(
        &self,
        principal: &Principal,
        account_id: i64,
        amount_minor: i64,
    ) -> ResultEngine<Account> {
        policy::require_regular(principal)?;
        validate_amount(amount_minor)?;
        retry_contention!(self.deposit_once(principal, account_id, amount_minor).await)
    }

    async fn deposit_once(
        &self,
        principal: &Principal,
        account_id: i64,
        amount_minor: i64,
    ) -> ResultEngine<Account> {
        with_tx!(self, |db_tx| {
            let model = self.lock_account_for_update(&db_tx, account_id).await?;
            let model = require_account_visible(model, principal)?;
            self.credit_account(&db_tx, model.id, amount_minor).await?;
            self.reload_account(&db_tx, account_id).await
        })
    }

    /// Atomically decrement an account balance by `amount_minor`.
    ///
    /// Sufficiency is evaluated under the row lock at the write itself, not
    /// at call entry: two racing withdrawals can both pass an entry check
    /// but only balance-covering ones commit.
    pub async fn withdraw(
        &self,
        principal: &Principal,
        account_id: i64,
        amount_minor: i64,
    ) -> ResultEngine<Account> {
        policy::require_regular(principal)?;
        validate_amount(amount_minor)?;
        retry_contention!(self.withdraw_once(principal, account_id, amount_minor).await)
    }

    async fn withdraw_once(
        &self,
        principal: &Principal,
        account_id: i64,
        amount_minor: i64,
    ) -> ResultEngine<Account> {
        with_tx!(self, |db_tx| {
            let model = self.lock_account_for_update(&db_tx, account_id).await?;
            let model = require_account_visible(model, principal)?;
            self.debit_account(&db_tx, model.id, amount_minor).await?;
            self.reload_account(&db_tx, account_id).await
        })
    }

    /// Move `amount_minor` from one of the principal's accounts to an
    /// account owned by `to_user_id`, as a single atomic unit.
    ///
    /// The amount is interpreted in the sender's currency; a recipient
    /// account in another currency is rejected, never converted.
    pub async fn transfer(
        &self,
        principal: &Principal,
        from_account_id: i64,
        to_account_id: i64,
        to_user_id: i64,
        amount_minor: i64,
    ) -> ResultEngine<()> {
        policy::require_regular(principal)?;
        validate_amount(amount_minor)?;
        if from_account_id == to_account_id {
            return Err(EngineError::SameAccount(
                "from_account_id and to_account_id must differ".to_string(),
            ));
        }
        retry_contention!(
            self.transfer_once(
                principal,
                from_account_id,
                to_account_id,
                to_user_id,
                amount_minor,
            )
            .await
        )
    }

    async fn transfer_once(
        &self,
        principal: &Principal,
        from_account_id: i64,
        to_account_id: i64,
        to_user_id: i64,
        amount_minor: i64,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            // Global lock order: ascending account id, regardless of which
            // side is debited.
            let (low_id, high_id) = if from_account_id < to_account_id {
                (from_account_id, to_account_id)
            } else {
                (to_account_id, from_account_id)
            };
            let low = self.lock_account_for_update(&db_tx, low_id).await?;
            let high = self.lock_account_for_update(&db_tx, high_id).await?;
            let (sender, recipient) = if low_id == from_account_id {
                (low, high)
            } else {
                (high, low)
            };

            let sender = require_account_visible(sender, principal)?;
            if recipient.user_id != to_user_id {
                // Recipient binding does not resolve; reported exactly like
                // a missing account.
                return Err(EngineError::KeyNotFound("account not exists".to_string()));
            }
            ensure_same_currency(
                model_currency(&sender.currency)?,
                model_currency(&recipient.currency)?,
            )?;

            self.debit_account(&db_tx, sender.id, amount_minor).await?;
            self.credit_account(&db_tx, recipient.id, amount_minor).await?;
            Ok(())
        })
    }

    /// Guarded increment. The filter keeps the update a no-op if the row
    /// vanished, which the caller has already ruled out under its lock.
    async fn credit_account(
        &self,
        db_tx: &DatabaseTransaction,
        account_id: i64,
        amount_minor: i64,
    ) -> ResultEngine<()> {
        let result = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::Balance,
                Expr::col(accounts::Column::Balance).add(amount_minor),
            )
            .filter(accounts::Column::Id.eq(account_id))
            .exec(db_tx)
            .await?;
        if result.rows_affected == 0 {
            return Err(EngineError::KeyNotFound("account not exists".to_string()));
        }
        Ok(())
    }

    /// Guarded decrement: the `balance >= amount` predicate rides on the
    /// update statement itself, so the non-negativity invariant is enforced
    /// at commit time even if the store downgraded our read lock.
    async fn debit_account(
        &self,
        db_tx: &DatabaseTransaction,
        account_id: i64,
        amount_minor: i64,
    ) -> ResultEngine<()> {
        let result = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::Balance,
                Expr::col(accounts::Column::Balance).sub(amount_minor),
            )
            .filter(accounts::Column::Id.eq(account_id))
            .filter(accounts::Column::Balance.gte(amount_minor))
            .exec(db_tx)
            .await?;
        if result.rows_affected == 0 {
            // The row exists (the caller holds its lock), so the guard that
            // failed is the balance predicate.
            return Err(EngineError::InsufficientFunds(format!(
                "account {account_id}"
            )));
        }
        Ok(())
    }

    async fn reload_account(
        &self,
        db_tx: &DatabaseTransaction,
        account_id: i64,
    ) -> ResultEngine<Account> {
        let model = self
            .find_account(db_tx, account_id)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("account not exists".to_string()))?;
        Account::try_from(model)
    }
}
