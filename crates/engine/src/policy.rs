//! Stateless authorization decisions.
//!
//! Pure functions over `(role, principal user id, target owner id)`; no
//! database access and no side effects. The engine enforces these at every
//! entry point so the core stays safe to call from any future interface,
//! not only the HTTP layer.

use crate::{EngineError, Principal, ResultEngine, Role};

/// May `principal` view or mutate the balance of an account owned by
/// `owner_user_id`? Monetary access is an owner-only regular-user capability.
pub(crate) fn owns_account(principal: &Principal, owner_user_id: i64) -> bool {
    principal.role == Role::Regular && principal.user_id == owner_user_id
}

/// Monetary operations (view/deposit/withdraw/transfer) are not available to
/// administrators at all, regardless of target.
pub(crate) fn require_regular(principal: &Principal) -> ResultEngine<()> {
    match principal.role {
        Role::Regular => Ok(()),
        Role::Admin => Err(EngineError::Forbidden(
            "operation not available to administrators".to_string(),
        )),
    }
}

/// Fleet-wide user management is an admin-only capability.
pub(crate) fn require_admin(principal: &Principal) -> ResultEngine<()> {
    match principal.role {
        Role::Admin => Ok(()),
        Role::Regular => Err(EngineError::Forbidden(
            "operation requires an administrator".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular(user_id: i64) -> Principal {
        Principal::new(user_id, Role::Regular)
    }

    fn admin() -> Principal {
        Principal::new(-1, Role::Admin)
    }

    #[test]
    fn regular_user_owns_only_its_accounts() {
        assert!(owns_account(&regular(1), 1));
        assert!(!owns_account(&regular(1), 2));
    }

    #[test]
    fn admin_never_owns_an_account() {
        assert!(!owns_account(&admin(), 1));
        assert!(!owns_account(&admin(), -1));
    }

    #[test]
    fn monetary_capability_is_regular_only() {
        assert!(require_regular(&regular(1)).is_ok());
        assert_eq!(
            require_regular(&admin()),
            Err(EngineError::Forbidden(
                "operation not available to administrators".to_string()
            ))
        );
    }

    #[test]
    fn user_management_is_admin_only() {
        assert!(require_admin(&admin()).is_ok());
        assert!(matches!(
            require_admin(&regular(1)),
            Err(EngineError::Forbidden(_))
        ));
    }
}
