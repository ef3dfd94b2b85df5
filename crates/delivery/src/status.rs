//! The two status tracks of a delivery request.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use intake_core::DomainError;

/// Supplier-facing lifecycle.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Draft,
    Pending,
    Delivered,
    Cancelled,
    Deleted,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 5] = [
        DeliveryStatus::Draft,
        DeliveryStatus::Pending,
        DeliveryStatus::Delivered,
        DeliveryStatus::Cancelled,
        DeliveryStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Draft => "draft",
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Cancelled => "cancelled",
            DeliveryStatus::Deleted => "deleted",
        }
    }

    /// Every status a default listing shows.
    pub fn visible() -> Vec<DeliveryStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| *s != DeliveryStatus::Deleted)
            .collect()
    }
}

impl core::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::invalid_data(format!("unknown delivery status '{s}'")))
    }
}

/// Operator-facing review track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminStatus {
    Draft,
    NewRequest,
    QuantityConfirm,
    AdminConfirm,
    Arrived,
    MainProductRegister,
    Published,
    StopProduct,
    Cancelled,
    Deleted,
}

impl AdminStatus {
    pub const ALL: [AdminStatus; 10] = [
        AdminStatus::Draft,
        AdminStatus::NewRequest,
        AdminStatus::QuantityConfirm,
        AdminStatus::AdminConfirm,
        AdminStatus::Arrived,
        AdminStatus::MainProductRegister,
        AdminStatus::Published,
        AdminStatus::StopProduct,
        AdminStatus::Cancelled,
        AdminStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdminStatus::Draft => "draft",
            AdminStatus::NewRequest => "new_request",
            AdminStatus::QuantityConfirm => "quantity_confirm",
            AdminStatus::AdminConfirm => "admin_confirm",
            AdminStatus::Arrived => "arrived",
            AdminStatus::MainProductRegister => "main_product_register",
            AdminStatus::Published => "published",
            AdminStatus::StopProduct => "stop_product",
            AdminStatus::Cancelled => "cancelled",
            AdminStatus::Deleted => "deleted",
        }
    }

    /// Review stage a request starts in when created with `status`.
    pub fn initial_for(status: DeliveryStatus) -> Option<AdminStatus> {
        match status {
            DeliveryStatus::Draft => Some(AdminStatus::Draft),
            DeliveryStatus::Pending => Some(AdminStatus::NewRequest),
            _ => None,
        }
    }
}

impl core::fmt::Display for AdminStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdminStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::invalid_data(format!("unknown admin status '{s}'")))
    }
}
