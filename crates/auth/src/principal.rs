use serde::{Deserialize, Serialize};

use intake_core::{StoreId, UserId};

use crate::Role;

/// A fully resolved acting principal.
///
/// Construction is the caller's business (session, token, service account);
/// this crate only consumes the resolved identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    /// Store the principal acts for. `None` for operators.
    pub store_id: Option<StoreId>,
}

impl Principal {
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
            store_id: None,
        }
    }

    pub fn store_prime(user_id: UserId, store_id: StoreId) -> Self {
        Self {
            user_id,
            role: Role::StorePrime,
            store_id: Some(store_id),
        }
    }

    pub fn store_staff(user_id: UserId, store_id: StoreId) -> Self {
        Self {
            user_id,
            role: Role::StoreStaff,
            store_id: Some(store_id),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}
