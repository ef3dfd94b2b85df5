//! Incoming payloads for creating and updating delivery requests.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use intake_core::{
    DeliveryRequestId, DomainError, DomainResult, ProductId, StoreId, VariantId,
};

use crate::request::{DeliveryRequest, DeliveryRequestVariant, checked_quantity};
use crate::status::{AdminStatus, DeliveryStatus};

/// Payload for a new request (root or child).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateDeliveryRequest {
    pub status: DeliveryStatus,
    #[serde(default)]
    pub rank: i32,
    pub suggested_price: Option<u64>,
    pub background_type: Option<String>,
    pub shooting: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
    #[serde(default)]
    pub redelivery_flag: bool,
    /// Present on the child-creation path: the product staged by this request.
    pub product: Option<ProductInput>,
}

impl CreateDeliveryRequest {
    /// Cross-field checks that do not need storage.
    pub fn validate(&self) -> DomainResult<()> {
        let Some(product) = &self.product else {
            return Ok(());
        };

        if self.status == DeliveryStatus::Draft && product.variants.iter().any(VariantInput::has_override) {
            return Err(DomainError::invalid_data(
                "a draft request cannot record a different received quantity",
            ));
        }
        total_requested(&product.variants).map(|_| ())
    }

    /// Materialize the row. Timestamps and derived fields follow the creation rules:
    /// `admin_status` is derived from `status` and a pending request is released now.
    pub fn to_request(
        &self,
        id: DeliveryRequestId,
        display_id: u64,
        store_id: StoreId,
        parent_id: Option<DeliveryRequestId>,
        now: DateTime<Utc>,
    ) -> DeliveryRequest {
        DeliveryRequest {
            id,
            display_id,
            store_id,
            parent_id,
            product_id: None,
            status: self.status,
            admin_status: AdminStatus::initial_for(self.status),
            suggested_price: self.suggested_price,
            background_type: self.background_type.clone(),
            shooting: self.shooting.clone(),
            total_stock: 0,
            rank: self.rank,
            redelivery_flag: self.redelivery_flag,
            metadata: self.metadata.clone(),
            created_at: now,
            updated_at: now,
            released_at: (self.status == DeliveryStatus::Pending).then_some(now),
            canceled_at: None,
            delivered_at: None,
            deleted_at: None,
            inventory_applied_at: None,
        }
    }
}

/// One item of a multi-item create: all items must share a store and a status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDeliveryItem {
    pub store_id: StoreId,
    pub request: CreateDeliveryRequest,
}

/// Check a multi-item create and return the common store and status.
pub fn validate_batch(items: &[NewDeliveryItem]) -> DomainResult<(StoreId, DeliveryStatus)> {
    let first = items
        .first()
        .ok_or_else(|| DomainError::invalid_data("a delivery batch needs at least one item"))?;

    if items.iter().any(|item| item.store_id != first.store_id) {
        return Err(DomainError::invalid_data("a delivery batch cannot span several stores"));
    }
    if items.iter().any(|item| item.request.status != first.request.status) {
        return Err(DomainError::invalid_data(
            "a delivery batch cannot mix target statuses",
        ));
    }
    for item in items {
        item.request.validate()?;
    }
    Ok((first.store_id, first.request.status))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductInput {
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub handle: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub material: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
    #[serde(default)]
    pub variants: Vec<VariantInput>,
}

/// A variant as submitted with a request.
///
/// `inventory_quantity` is the quantity *requested for delivery*; it never
/// becomes live stock directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantInput {
    /// Set when the variant already exists on the product.
    pub id: Option<VariantId>,
    pub title: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    pub weight: Option<u32>,
    pub inventory_quantity: i64,
    #[serde(default)]
    pub different_quantity_flag: bool,
    pub different_quantity: Option<i64>,
}

impl VariantInput {
    pub fn has_override(&self) -> bool {
        self.different_quantity_flag || self.different_quantity.is_some()
    }

    pub fn requested_quantity(&self) -> DomainResult<u32> {
        checked_quantity(self.inventory_quantity, "inventory_quantity")
    }

    /// Build the link row capturing requested quantity and any override.
    pub fn link_row(
        &self,
        variant_id: VariantId,
        delivery_request_id: DeliveryRequestId,
    ) -> DomainResult<DeliveryRequestVariant> {
        let different_quantity = self
            .different_quantity
            .map(|q| checked_quantity(q, "different_quantity"))
            .transpose()?;

        Ok(DeliveryRequestVariant {
            variant_id,
            delivery_request_id,
            delivery_quantity: self.requested_quantity()?,
            different_quantity_flag: self.different_quantity_flag,
            different_quantity,
        })
    }
}

/// Sum of requested quantities; fails on the first negative one.
pub fn total_requested(variants: &[VariantInput]) -> DomainResult<u64> {
    variants.iter().try_fold(0u64, |acc, v| {
        Ok(acc + u64::from(v.requested_quantity()?))
    })
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateDeliveryRequest {
    pub status: Option<DeliveryStatus>,
    pub admin_status: Option<AdminStatus>,
    pub rank: Option<i32>,
    pub suggested_price: Option<u64>,
    pub background_type: Option<String>,
    pub shooting: Option<String>,
    /// Merged key-by-key into the stored metadata.
    pub metadata: Option<Map<String, JsonValue>>,
    pub product: Option<ProductUpdateInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdateInput {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub handle: Option<String>,
    pub tags: Option<Vec<String>>,
    pub material: Option<String>,
    pub metadata: Option<Map<String, JsonValue>>,
    /// When present, replaces the request's variant set.
    pub variants: Option<Vec<VariantInput>>,
}

/// Payload of the restock path: more units of a product that was already delivered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddStockInput {
    pub product_id: ProductId,
    #[serde(default)]
    pub status: DeliveryStatus,
    #[serde(default)]
    pub rank: i32,
    pub variants: Vec<VariantInput>,
}
