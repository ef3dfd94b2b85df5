use serde::{Deserialize, Serialize};

/// Role of an acting principal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Back-office operator.
    Admin,
    /// Owner of a supplier store ("store prime").
    StorePrime,
    /// Member of a supplier store without ownership rights.
    StoreStaff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::StorePrime => "store_prime",
            Role::StoreStaff => "store_staff",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
