//! Resolved caller identity.
//!
//! Every engine operation takes the principal as an explicit argument; the
//! engine never reads authentication state from ambient context. The request
//! layer resolves credentials to a `Principal` and the engine trusts it.

use crate::EngineError;

/// Capability class of a principal.
///
/// `Regular` and `Admin` are disjoint capability sets: a regular user owns
/// monetary operations on its own accounts, an admin owns fleet-wide user
/// management and nothing else.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Regular,
    Admin,
}

impl Role {
    /// Canonical role string used by the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Regular => "REGULAR",
            Role::Admin => "ADMIN",
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "REGULAR" => Ok(Role::Regular),
            "ADMIN" => Ok(Role::Admin),
            other => Err(EngineError::Forbidden(format!("invalid role: {other}"))),
        }
    }
}

/// The authenticated identity an operation is invoked on behalf of.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub role: Role,
}

impl Principal {
    #[must_use]
    pub const fn new(user_id: i64, role: Role) -> Self {
        Self { user_id, role }
    }
}
