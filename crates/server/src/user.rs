//! User provisioning and profile endpoints.
//!
//! Provisioning (`POST /user`) is not behind Basic auth; it is gated by the
//! `x-security-admin-key` header instead, so an operator can bootstrap the
//! first user on an empty database.

use api_types::user::{CreateUserRequest, UserView, UsersResponse};
use axum::{Extension, Json, extract::State};
use axum_extra::{
    TypedHeader,
    headers::{Error as AxumError, Header},
};
use sea_orm::entity::prelude::*;

use crate::{ServerError, account::account_view, server::ServerState};
use engine::{EngineError, Principal};

static ADMIN_KEY_HEADER: axum::http::HeaderName =
    axum::http::HeaderName::from_static("x-security-admin-key");

/// Credential row backing the auth middleware.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub username: String,
    pub password: String,
    pub role: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// `TypedHeader` for the provisioning secret.
#[derive(Debug)]
pub(crate) struct AdminKeyHeader(String);

impl Header for AdminKeyHeader {
    fn name() -> &'static axum::http::HeaderName {
        &ADMIN_KEY_HEADER
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, AxumError>
    where
        Self: Sized,
        I: Iterator<Item = &'i axum::http::HeaderValue>,
    {
        let value = values.next().ok_or_else(AxumError::invalid)?;
        let Ok(value) = value.to_str() else {
            return Err(AxumError::invalid());
        };

        Ok(AdminKeyHeader(value.to_string()))
    }

    fn encode<E: Extend<axum::http::HeaderValue>>(&self, values: &mut E) {
        match axum::http::HeaderValue::from_str(&self.0) {
            Ok(value) => values.extend(std::iter::once(value)),
            Err(_) => tracing::error!("failed to encode admin key header"),
        }
    }
}

fn user_view(profile: engine::UserProfile) -> UserView {
    UserView {
        id: profile.id,
        username: profile.username,
        accounts: profile.accounts.into_iter().map(account_view).collect(),
    }
}

pub async fn create(
    admin_key: Option<TypedHeader<AdminKeyHeader>>,
    State(state): State<ServerState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<UserView>, ServerError> {
    let presented = admin_key.map(|header| header.0.0);
    if presented.as_deref() != Some(state.admin_key.as_str()) {
        return Err(ServerError::Engine(EngineError::Forbidden(
            "invalid admin key".to_string(),
        )));
    }

    let profile = state
        .engine
        .create_user(&payload.username, &payload.password)
        .await?;
    Ok(Json(user_view(profile)))
}

pub async fn list(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
) -> Result<Json<UsersResponse>, ServerError> {
    let users = state
        .engine
        .list_users(&principal)
        .await?
        .into_iter()
        .map(user_view)
        .collect();
    Ok(Json(UsersResponse { users }))
}

pub async fn me(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
) -> Result<Json<UserView>, ServerError> {
    let profile = state.engine.me(&principal).await?;
    Ok(Json(user_view(profile)))
}
