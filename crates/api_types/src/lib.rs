//! Wire-format types shared by the HTTP server and its clients.
//!
//! Monetary amounts are integer minor units throughout; the JSON field names
//! follow the camelCase convention of the public API.

use serde::{Deserialize, Serialize};

/// Supported account currencies. Serialized as upper-case ISO codes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Rub,
    Usd,
    Eur,
}

pub mod account {
    use super::*;

    /// One account as exposed over the API.
    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AccountView {
        pub id: i64,
        pub owner_user_id: i64,
        /// Balance in minor units of `currency`.
        pub balance: i64,
        pub currency: Currency,
    }

    /// Request body for deposits and withdrawals.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct BalanceChange {
        /// Minor units, must be > 0.
        pub amount: i64,
    }
}

pub mod transfer {
    use super::*;

    /// Request body for a two-account transfer.
    ///
    /// `to_user_id` must match the owner of `to_account_id`; a stale or
    /// wrong binding fails the whole transfer.
    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TransferRequest {
        pub from_account_id: i64,
        pub to_account_id: i64,
        pub to_user_id: i64,
        /// Minor units of the sender's currency, must be > 0.
        pub amount: i64,
    }
}

pub mod user {
    use super::*;

    /// Request body for provisioning a user.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct CreateUserRequest {
        pub username: String,
        pub password: String,
    }

    /// A user with their accounts.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct UserView {
        pub id: i64,
        pub username: String,
        pub accounts: Vec<account::AccountView>,
    }

    /// Response body for listing users.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct UsersResponse {
        pub users: Vec<UserView>,
    }
}
