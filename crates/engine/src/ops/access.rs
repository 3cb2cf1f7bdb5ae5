//! Typed reads over the ledger store.
//!
//! Mutating operations must take their balance decisions on rows read
//! through [`Engine::lock_account_for_update`], which holds an exclusive row
//! lock for the rest of the enclosing transaction. Plain reads are for
//! display paths only.

use sea_orm::{ConnectionTrait, DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect, prelude::*};

use crate::{EngineError, Principal, ResultEngine, accounts, policy, users};

use super::Engine;

/// Visibility filter shared by every account-touching operation: an account
/// the principal does not own reads as absent, so "forbidden" and "missing"
/// are indistinguishable to the caller.
pub(super) fn require_account_visible(
    model: accounts::Model,
    principal: &Principal,
) -> ResultEngine<accounts::Model> {
    if !policy::owns_account(principal, model.user_id) {
        return Err(EngineError::KeyNotFound("account not exists".to_string()));
    }
    Ok(model)
}

impl Engine {
    pub(super) async fn find_account<C: ConnectionTrait>(
        &self,
        db: &C,
        account_id: i64,
    ) -> ResultEngine<Option<accounts::Model>> {
        accounts::Entity::find_by_id(account_id)
            .one(db)
            .await
            .map_err(Into::into)
    }

    /// Read an account under an exclusive row lock scoped to `db_tx`.
    ///
    /// On backends with row locking this renders `SELECT ... FOR UPDATE`;
    /// sqlite serializes writers at the store level instead, and the guarded
    /// balance updates keep the sufficiency check atomic either way.
    pub(super) async fn lock_account_for_update(
        &self,
        db_tx: &DatabaseTransaction,
        account_id: i64,
    ) -> ResultEngine<accounts::Model> {
        accounts::Entity::find_by_id(account_id)
            .lock_exclusive()
            .one(db_tx)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("account not exists".to_string()))
    }

    pub(super) async fn accounts_by_owner<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: i64,
    ) -> ResultEngine<Vec<accounts::Model>> {
        accounts::Entity::find()
            .filter(accounts::Column::UserId.eq(user_id))
            .order_by_asc(accounts::Column::Id)
            .all(db)
            .await
            .map_err(Into::into)
    }

    pub(super) async fn require_user<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: i64,
    ) -> ResultEngine<users::Model> {
        users::Entity::find_by_id(user_id)
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("user not exists".to_string()))
    }
}
