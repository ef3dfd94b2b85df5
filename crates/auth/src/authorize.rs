use thiserror::Error;

use intake_core::StoreId;

use crate::{Action, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' may not {action}")]
    Forbidden { role: Role, action: Action },

    #[error("store mismatch: principal does not act for the owning store")]
    StoreMismatch,
}

/// Decide whether `principal` may perform `action` on a tree owned by `owner`.
///
/// - Admins may do everything.
/// - Store primes may manage their own store's trees, except admin-only actions.
/// - Store staff may only read their own store's trees.
///
/// No IO, no panics.
pub fn authorize(principal: &Principal, action: Action, owner: StoreId) -> Result<(), AuthzError> {
    let forbidden = || AuthzError::Forbidden {
        role: principal.role,
        action,
    };

    match principal.role {
        Role::Admin => Ok(()),
        Role::StorePrime => {
            if action.is_admin_only() {
                return Err(forbidden());
            }
            ensure_owner(principal, owner)
        }
        Role::StoreStaff => {
            if action != Action::Read {
                return Err(forbidden());
            }
            ensure_owner(principal, owner)
        }
    }
}

fn ensure_owner(principal: &Principal, owner: StoreId) -> Result<(), AuthzError> {
    if principal.store_id == Some(owner) {
        Ok(())
    } else {
        tracing::debug!(user_id = %principal.user_id, store_id = %owner, "store ownership check failed");
        Err(AuthzError::StoreMismatch)
    }
}
