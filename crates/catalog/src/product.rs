use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use intake_core::{Entity, ProductId, ShippingProfileId, StoreId, UserId, VariantId};

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Draft,
    Proposed,
    Published,
    Rejected,
    /// Staged by a delivery request; not visible to shoppers until arrival.
    DeliveryRequest,
}

/// Price in the smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub amount: u64,
    pub currency_code: String,
}

impl Money {
    pub fn new(amount: u64, currency_code: impl Into<String>) -> Self {
        Self {
            amount,
            currency_code: currency_code.into().to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub store_id: StoreId,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub handle: Option<String>,
    pub status: ProductStatus,
    pub tags: Vec<String>,
    pub material: Option<String>,
    pub shipping_profile_id: Option<ShippingProfileId>,
    pub created_by: UserId,
    pub metadata: Map<String, JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> ProductId {
        self.id
    }
}

/// Input for creating a product (created without variants).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub store_id: StoreId,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub handle: Option<String>,
    pub status: ProductStatus,
    pub tags: Vec<String>,
    pub material: Option<String>,
    pub shipping_profile_id: Option<ShippingProfileId>,
    pub metadata: Map<String, JsonValue>,
}

impl NewProduct {
    pub fn into_product(self, id: ProductId, created_by: UserId, now: DateTime<Utc>) -> Product {
        Product {
            id,
            store_id: self.store_id,
            title: self.title,
            subtitle: self.subtitle,
            description: self.description,
            handle: self.handle,
            status: self.status,
            tags: self.tags,
            material: self.material,
            shipping_profile_id: self.shipping_profile_id,
            created_by,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial product update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub handle: Option<String>,
    pub status: Option<ProductStatus>,
    pub tags: Option<Vec<String>>,
    pub material: Option<String>,
    pub metadata: Option<Map<String, JsonValue>>,
}

impl Product {
    pub fn apply_patch(&mut self, patch: ProductPatch, now: DateTime<Utc>) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(subtitle) = patch.subtitle {
            self.subtitle = Some(subtitle);
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(handle) = patch.handle {
            self.handle = Some(handle);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(material) = patch.material {
            self.material = Some(material);
        }
        if let Some(metadata) = patch.metadata {
            self.metadata.extend(metadata);
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub title: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    /// Option values keyed by option title (e.g. "color" -> "navy").
    pub options: BTreeMap<String, String>,
    /// Live, sellable stock.
    pub inventory_quantity: u32,
    pub prices: Vec<Money>,
    pub weight: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for ProductVariant {
    type Id = VariantId;

    fn id(&self) -> VariantId {
        self.id
    }
}

impl ProductVariant {
    /// Price in `currency_code`, if one is set.
    pub fn price_in(&self, currency_code: &str) -> Option<u64> {
        self.prices
            .iter()
            .find(|p| p.currency_code.eq_ignore_ascii_case(currency_code))
            .map(|p| p.amount)
    }

    pub fn apply_patch(&mut self, patch: VariantPatch, now: DateTime<Utc>) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(sku) = patch.sku {
            self.sku = Some(sku);
        }
        if let Some(barcode) = patch.barcode {
            self.barcode = Some(barcode);
        }
        if let Some(options) = patch.options {
            self.options = options;
        }
        if let Some(quantity) = patch.inventory_quantity {
            self.inventory_quantity = quantity;
        }
        if let Some(prices) = patch.prices {
            self.prices = prices;
        }
        if let Some(weight) = patch.weight {
            self.weight = Some(weight);
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVariant {
    pub title: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub options: BTreeMap<String, String>,
    pub inventory_quantity: u32,
    pub prices: Vec<Money>,
    pub weight: Option<u32>,
}

impl NewVariant {
    pub fn into_variant(self, id: VariantId, product_id: ProductId, now: DateTime<Utc>) -> ProductVariant {
        ProductVariant {
            id,
            product_id,
            title: self.title,
            sku: self.sku,
            barcode: self.barcode,
            options: self.options,
            inventory_quantity: self.inventory_quantity,
            prices: self.prices,
            weight: self.weight,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial variant update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantPatch {
    pub title: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub options: Option<BTreeMap<String, String>>,
    pub inventory_quantity: Option<u32>,
    pub prices: Option<Vec<Money>>,
    pub weight: Option<u32>,
}
