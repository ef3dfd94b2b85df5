//! Assembled read views of a request and its subtree.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use intake_catalog::{Product, ProductVariant};
use intake_core::VariantId;

use crate::request::{DeliveryRequest, DeliveryRequestVariant};
use crate::status::DeliveryStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub variants: Vec<ProductVariant>,
}

/// A request with whichever relations the caller asked to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRequestDetail {
    #[serde(flatten)]
    pub request: DeliveryRequest,
    pub product: Option<ProductDetail>,
    pub request_variants: Vec<DeliveryRequestVariant>,
    pub children: Vec<DeliveryRequestDetail>,
}

impl DeliveryRequestDetail {
    pub fn new(request: DeliveryRequest) -> Self {
        Self {
            request,
            product: None,
            request_variants: Vec::new(),
            children: Vec::new(),
        }
    }

    fn linked_variant_ids(&self) -> HashSet<VariantId> {
        self.request_variants.iter().map(|rv| rv.variant_id).collect()
    }

    /// Narrow loaded product variants to the ones linked to this request,
    /// here and in every child.
    pub fn pick_linked_variants(&mut self) {
        let linked = self.linked_variant_ids();
        if let Some(product) = &mut self.product {
            product.variants.retain(|v| linked.contains(&v.id));
        }
        for child in &mut self.children {
            child.pick_linked_variants();
        }
    }

    pub fn product_title(&self) -> Option<&str> {
        self.product.as_ref().map(|p| p.product.title.as_str())
    }
}

/// Shape a root for list views.
///
/// Children are kept when their status is in `statuses` (default: every status
/// but deleted) and, if `title` is given, their product title contains it
/// case-insensitively. Surviving children only show their linked variants.
pub fn decorate(
    mut detail: DeliveryRequestDetail,
    statuses: Option<&[DeliveryStatus]>,
    title: Option<&str>,
) -> DeliveryRequestDetail {
    let statuses = statuses.map_or_else(DeliveryStatus::visible, <[_]>::to_vec);
    let needle = title.map(str::to_lowercase);

    detail.children.retain(|child| {
        statuses.contains(&child.request.status)
            && needle.as_deref().is_none_or(|needle| {
                child
                    .product_title()
                    .is_some_and(|t| t.to_lowercase().contains(needle))
            })
    });
    for child in &mut detail.children {
        child.pick_linked_variants();
    }
    detail
}
