//! Persisted shapes: the request tree, its variant links and the audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use intake_core::{
    DeliveryRequestId, DomainError, DomainResult, Entity, HistoryId, ProductId, StoreId, UserId,
    VariantId,
};

use crate::status::{AdminStatus, DeliveryStatus};

/// Width `display_code` pads to unless configured otherwise.
pub const DEFAULT_DISPLAY_CODE_WIDTH: usize = 5;

const NOTE_KEY: &str = "note";

/// A node in the delivery-request tree.
///
/// Roots (`parent_id == None`) represent one intake batch of a store and carry
/// no product. Children carry exactly one product once they leave draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub id: DeliveryRequestId,
    /// Sequence-generated, human-facing number.
    pub display_id: u64,
    pub store_id: StoreId,
    pub parent_id: Option<DeliveryRequestId>,
    pub product_id: Option<ProductId>,
    pub status: DeliveryStatus,
    pub admin_status: Option<AdminStatus>,
    pub suggested_price: Option<u64>,
    pub background_type: Option<String>,
    pub shooting: Option<String>,
    /// Sum of requested quantities, denormalized for list views.
    pub total_stock: u64,
    pub rank: i32,
    pub redelivery_flag: bool,
    pub metadata: Map<String, JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Set once the linked quantities have been added to live stock.
    #[serde(default)]
    pub inventory_applied_at: Option<DateTime<Utc>>,
}

impl DeliveryRequest {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.status == DeliveryStatus::Deleted
    }

    /// Zero-padded `display_id`.
    pub fn display_code(&self, width: usize) -> String {
        format!("{:0width$}", self.display_id, width = width)
    }

    pub fn note(&self) -> Option<&str> {
        self.metadata.get(NOTE_KEY).and_then(JsonValue::as_str)
    }

    /// Write the operator note, leaving every other metadata key alone.
    pub fn set_note(&mut self, note: impl Into<String>) {
        self.metadata
            .insert(NOTE_KEY.to_string(), JsonValue::String(note.into()));
    }
}

impl Entity for DeliveryRequest {
    type Id = DeliveryRequestId;

    fn id(&self) -> DeliveryRequestId {
        self.id
    }
}

/// Composite key of a `DeliveryRequestVariant`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestVariantKey {
    pub delivery_request_id: DeliveryRequestId,
    pub variant_id: VariantId,
}

/// Link between a child request and a product variant being delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequestVariant {
    pub variant_id: VariantId,
    pub delivery_request_id: DeliveryRequestId,
    pub delivery_quantity: u32,
    pub different_quantity_flag: bool,
    pub different_quantity: Option<u32>,
}

impl DeliveryRequestVariant {
    /// Quantity that becomes live stock on arrival: the recorded override when
    /// flagged, the requested quantity otherwise.
    pub fn received_quantity(&self) -> u32 {
        match (self.different_quantity_flag, self.different_quantity) {
            (true, Some(received)) => received,
            _ => self.delivery_quantity,
        }
    }
}

impl Entity for DeliveryRequestVariant {
    type Id = RequestVariantKey;

    fn id(&self) -> RequestVariantKey {
        RequestVariantKey {
            delivery_request_id: self.delivery_request_id,
            variant_id: self.variant_id,
        }
    }
}

/// Append-only audit row: a "before" image of a request taken by a privileged actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRequestHistory {
    pub id: HistoryId,
    pub delivery_request_id: DeliveryRequestId,
    pub created_by: UserId,
    /// Snapshot of the request (and, for roots, its subtree) without its `id`.
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl Entity for DeliveryRequestHistory {
    type Id = HistoryId;

    fn id(&self) -> HistoryId {
        self.id
    }
}

/// Convert a payload quantity into a stored one; negatives are rejected.
pub fn checked_quantity(value: i64, field: &str) -> DomainResult<u32> {
    u32::try_from(value).map_err(|_| {
        DomainError::invalid_data(format!("{field} must be between 0 and {}, got {value}", u32::MAX))
    })
}
