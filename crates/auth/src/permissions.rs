use serde::{Deserialize, Serialize};

/// Operations on a delivery-request tree that are subject to authorization.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Create,
    Update,
    /// Setting `admin_status` explicitly (review-track decisions).
    ChangeAdminStatus,
    Cancel,
    Delete,
    AddStock,
    AddInventory,
    Stop,
    SaveNote,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::ChangeAdminStatus => "change_admin_status",
            Action::Cancel => "cancel",
            Action::Delete => "delete",
            Action::AddStock => "add_stock",
            Action::AddInventory => "add_inventory",
            Action::Stop => "stop",
            Action::SaveNote => "save_note",
        }
    }

    /// Actions reserved for back-office operators.
    pub fn is_admin_only(&self) -> bool {
        matches!(
            self,
            Action::ChangeAdminStatus | Action::AddInventory | Action::Stop
        )
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
