//! Mapping request payloads onto catalog writes.
//!
//! A request payload may describe variants that already exist. Only the
//! presentation fields of such a variant are taken from the payload; live
//! stock, prices and identity stay authoritative in the catalog.

use intake_catalog::{Money, NewProduct, NewVariant, ProductPatch, ProductStatus, ProductVariant, VariantPatch};
use intake_core::{ShippingProfileId, StoreId};

use crate::input::{ProductInput, ProductUpdateInput, VariantInput};

/// Patch for an existing variant: only whitelisted fields are carried over.
///
/// `inventory_quantity` in the payload is the *requested* quantity and never
/// reaches the variant; `prices` are owned by the catalog once created.
pub fn merge_variant(existing: &ProductVariant, input: &VariantInput) -> VariantPatch {
    VariantPatch {
        title: (input.title != existing.title).then(|| input.title.clone()),
        sku: input.sku.clone(),
        barcode: input.barcode.clone(),
        options: (!input.options.is_empty()).then(|| input.options.clone()),
        weight: input.weight,
        inventory_quantity: None,
        prices: None,
    }
}

/// A variant staged for delivery: no live stock, priced at the suggested price.
pub fn staged_variant(input: &VariantInput, price: Money) -> NewVariant {
    NewVariant {
        title: input.title.clone(),
        sku: input.sku.clone(),
        barcode: input.barcode.clone(),
        options: input.options.clone(),
        inventory_quantity: 0,
        prices: vec![price],
        weight: input.weight,
    }
}

/// The product a child request stages, hidden behind the delivery-request status.
pub fn staged_product(
    input: &ProductInput,
    store_id: StoreId,
    shipping_profile_id: ShippingProfileId,
) -> NewProduct {
    NewProduct {
        store_id,
        title: input.title.clone(),
        subtitle: input.subtitle.clone(),
        description: input.description.clone(),
        handle: input.handle.clone(),
        status: ProductStatus::DeliveryRequest,
        tags: input.tags.clone(),
        material: input.material.clone(),
        shipping_profile_id: Some(shipping_profile_id),
        metadata: input.metadata.clone(),
    }
}

/// Product fields pushed on update. Arrival moves the product back to draft
/// so operators can register it.
pub fn product_patch(input: &ProductUpdateInput, newly_arrived: bool) -> ProductPatch {
    ProductPatch {
        title: input.title.clone(),
        subtitle: input.subtitle.clone(),
        description: input.description.clone(),
        handle: input.handle.clone(),
        status: newly_arrived.then_some(ProductStatus::Draft),
        tags: input.tags.clone(),
        material: input.material.clone(),
        metadata: input.metadata.clone(),
    }
}
