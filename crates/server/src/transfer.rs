//! Transfer endpoint.

use api_types::transfer::TransferRequest;
use axum::{Extension, Json, extract::State, http::StatusCode};

use crate::{ServerError, server::ServerState};
use engine::Principal;

pub async fn create(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Json(payload): Json<TransferRequest>,
) -> Result<StatusCode, ServerError> {
    state
        .engine
        .transfer(
            &principal,
            payload.from_account_id,
            payload.to_account_id,
            payload.to_user_id,
            payload.amount,
        )
        .await?;
    Ok(StatusCode::OK)
}
