//! User provisioning and profile reads.
//!
//! Provisioning is gated by an out-of-band admin key at the request layer,
//! not by a session principal, so `create_user` takes no principal. Profile
//! reads follow the capability table: listing the fleet is admin-only, "my
//! profile" is regular-only.

use sea_orm::{ActiveValue, QueryFilter, QueryOrder, SqlErr, TransactionTrait, prelude::*};

use crate::{
    Account, Currency, EngineError, Principal, ResultEngine, Role, UserProfile, accounts, policy,
    users,
};

use super::{Engine, normalize_required_name, retry_contention, with_tx};

impl Engine {
    /// Provision a new regular user with one zero-balance account per
    /// supported currency. The username must be unique.
    pub async fn create_user(&self, username: &str, password: &str) -> ResultEngine<UserProfile> {
        let username = normalize_required_name(username, "username")?;
        let password = normalize_required_name(password, "password")?;
        retry_contention!(self.create_user_once(&username, &password).await)
    }

    async fn create_user_once(
        &self,
        username: &str,
        password: &str,
    ) -> ResultEngine<UserProfile> {
        with_tx!(self, |db_tx| {
            let exists = users::Entity::find()
                .filter(users::Column::Username.eq(username))
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EngineError::ExistingKey(username.to_string()));
            }

            let insert = users::ActiveModel {
                id: ActiveValue::NotSet,
                username: ActiveValue::Set(username.to_string()),
                password: ActiveValue::Set(password.to_string()),
                role: ActiveValue::Set(Role::Regular.as_str().to_string()),
            }
            .insert(&db_tx)
            .await;
            let user = match insert {
                Ok(user) => user,
                // Lost a provisioning race: another writer took the username
                // between the check and the insert.
                Err(err)
                    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
                {
                    return Err(EngineError::ExistingKey(username.to_string()));
                }
                Err(err) => return Err(err.into()),
            };

            let mut opened = Vec::with_capacity(Currency::ALL.len());
            for currency in Currency::ALL {
                let model = accounts::ActiveModel {
                    id: ActiveValue::NotSet,
                    user_id: ActiveValue::Set(user.id),
                    currency: ActiveValue::Set(currency.code().to_string()),
                    balance: ActiveValue::Set(0),
                }
                .insert(&db_tx)
                .await?;
                opened.push(Account::try_from(model)?);
            }

            Ok(UserProfile {
                id: user.id,
                username: user.username,
                accounts: opened,
            })
        })
    }

    /// List every user with its accounts, ordered by user id. Admin-only.
    pub async fn list_users(&self, principal: &Principal) -> ResultEngine<Vec<UserProfile>> {
        policy::require_admin(principal)?;
        let rows = users::Entity::find()
            .order_by_asc(users::Column::Id)
            .find_with_related(accounts::Entity)
            .all(&self.database)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for (user, account_models) in rows {
            let accounts = account_models
                .into_iter()
                .map(Account::try_from)
                .collect::<ResultEngine<Vec<_>>>()?;
            out.push(UserProfile {
                id: user.id,
                username: user.username,
                accounts,
            });
        }
        Ok(out)
    }

    /// The principal's own profile with accounts. Regular-only.
    pub async fn me(&self, principal: &Principal) -> ResultEngine<UserProfile> {
        policy::require_regular(principal)?;
        let user = self.require_user(&self.database, principal.user_id).await?;
        let accounts = self
            .accounts_by_owner(&self.database, user.id)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;
        Ok(UserProfile {
            id: user.id,
            username: user.username,
            accounts,
        })
    }
}
