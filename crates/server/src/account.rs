//! Account read and balance-mutation endpoints.

use api_types::account::{AccountView, BalanceChange};
use axum::{
    Extension, Json,
    extract::{Path, State},
};

use crate::{ServerError, server::ServerState};
use engine::Principal;

pub(crate) fn map_currency(currency: engine::Currency) -> api_types::Currency {
    match currency {
        engine::Currency::Rub => api_types::Currency::Rub,
        engine::Currency::Usd => api_types::Currency::Usd,
        engine::Currency::Eur => api_types::Currency::Eur,
    }
}

pub(crate) fn account_view(account: engine::Account) -> AccountView {
    AccountView {
        id: account.id,
        owner_user_id: account.user_id,
        balance: account.balance,
        currency: map_currency(account.currency),
    }
}

pub async fn get(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(account_id): Path<i64>,
) -> Result<Json<AccountView>, ServerError> {
    let account = state.engine.account(&principal, account_id).await?;
    Ok(Json(account_view(account)))
}

pub async fn deposit(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(account_id): Path<i64>,
    Json(payload): Json<BalanceChange>,
) -> Result<Json<AccountView>, ServerError> {
    let account = state
        .engine
        .deposit(&principal, account_id, payload.amount)
        .await?;
    Ok(Json(account_view(account)))
}

pub async fn withdraw(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(account_id): Path<i64>,
    Json(payload): Json<BalanceChange>,
) -> Result<Json<AccountView>, ServerError> {
    let account = state
        .engine
        .withdraw(&principal, account_id, payload.amount)
        .await?;
    Ok(Json(account_view(account)))
}
