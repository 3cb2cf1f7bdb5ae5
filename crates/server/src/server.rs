use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use std::sync::Arc;

use crate::{account, transfer, user};
use engine::{Engine, Principal, Role};

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
    pub db: DatabaseConnection,
    /// Shared secret gating user provisioning; compared against the
    /// `x-security-admin-key` request header.
    pub admin_key: String,
}

/// Resolves Basic credentials against the users table and attaches the
/// authenticated [`Principal`] to the request.
///
/// Any failure here is a uniform 401; the capability checks downstream
/// never see an unauthenticated request.
async fn auth(
    auth_header: Option<TypedHeader<Authorization<Basic>>>,
    State(state): State<ServerState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(auth_header) = auth_header else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    if auth_header.username().is_empty() || auth_header.password().is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let user: Option<user::Model> = user::Entity::find()
        .filter(user::Column::Username.eq(auth_header.username()))
        .filter(user::Column::Password.eq(auth_header.password()))
        .one(&state.db)
        .await
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let user = if let Some(user) = user {
        user
    } else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    let role = Role::try_from(user.role.as_str()).map_err(|_| StatusCode::UNAUTHORIZED)?;

    request
        .extensions_mut()
        .insert(Principal::new(user.id, role));
    Ok(next.run(request).await)
}

fn router(state: ServerState) -> Router {
    // `/user` (provisioning) sits after the route_layer on purpose: it is
    // gated by the admin key header, not by Basic credentials.
    Router::new()
        .route("/account/{id}", get(account::get))
        .route("/account/deposit/{id}", post(account::deposit))
        .route("/account/withdraw/{id}", post(account::withdraw))
        .route("/transfer", post(transfer::create))
        .route("/user/list", get(user::list))
        .route("/user/me", get(user::me))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth))
        .route("/user", post(user::create))
        .with_state(state)
}

/// Build the full application router. Used by `run_with_listener` and by
/// the HTTP integration tests, which drive it in-process.
pub fn app(engine: Engine, db: DatabaseConnection, admin_key: String) -> Router {
    router(ServerState {
        engine: Arc::new(engine),
        db,
        admin_key,
    })
}

pub async fn run(engine: Engine, db: DatabaseConnection, admin_key: String) {
    let listener = match tokio::net::TcpListener::bind("127.0.0.1:3000").await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind server listener: {err}");
            return;
        }
    };
    if let Err(err) = run_with_listener(engine, db, admin_key, listener).await {
        tracing::error!("server failed: {err}");
    }
}

pub async fn run_with_listener(
    engine: Engine,
    db: DatabaseConnection,
    admin_key: String,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(engine, db, admin_key)).await
}

pub fn spawn_with_listener(
    engine: Engine,
    db: DatabaseConnection,
    admin_key: String,
    listener: tokio::net::TcpListener,
) -> Result<std::net::SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(engine, db, admin_key, listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}
