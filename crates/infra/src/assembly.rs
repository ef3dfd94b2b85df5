//! Loading a request together with the relations a caller asked for.

use serde::{Deserialize, Serialize};

use intake_delivery::{DeliveryRequest, DeliveryRequestDetail, ProductDetail};

use crate::collaborators::ProductService;
use crate::error::ServiceResult;
use crate::store::{Repository, RequestVariantFilter, Tables};

/// Relations to load alongside a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveOptions {
    pub with_product: bool,
    pub with_children: bool,
    pub with_request_variants: bool,
    /// Narrow loaded variants to the ones linked to the request (implies
    /// loading the links).
    pub pick_linked_variants: bool,
}

impl RetrieveOptions {
    /// Everything, including each child's product and links.
    pub fn full() -> Self {
        Self {
            with_product: true,
            with_children: true,
            with_request_variants: true,
            pick_linked_variants: false,
        }
    }

    pub fn picked() -> Self {
        Self {
            pick_linked_variants: true,
            ..Self::full()
        }
    }
}

pub(crate) fn load_detail(
    tables: &Tables,
    products: &dyn ProductService,
    request: DeliveryRequest,
    options: RetrieveOptions,
) -> ServiceResult<DeliveryRequestDetail> {
    let mut detail = load_relations(tables, products, request, options)?;
    if options.pick_linked_variants {
        detail.pick_linked_variants();
    }
    Ok(detail)
}

fn load_relations(
    tables: &Tables,
    products: &dyn ProductService,
    request: DeliveryRequest,
    options: RetrieveOptions,
) -> ServiceResult<DeliveryRequestDetail> {
    let mut detail = DeliveryRequestDetail::new(request);
    let id = detail.request.id;

    if options.with_product {
        if let Some(product_id) = detail.request.product_id {
            let product = products.retrieve(tables, product_id)?;
            let variants = products.list_variants(tables, product_id);
            detail.product = Some(ProductDetail { product, variants });
        }
    }
    if options.with_request_variants || options.pick_linked_variants {
        detail.request_variants = tables
            .request_variants
            .find(&RequestVariantFilter::for_request(id));
    }
    if options.with_children {
        detail.children = tables
            .requests
            .children_of(id)
            .into_iter()
            .map(|child| load_relations(tables, products, child, options))
            .collect::<ServiceResult<_>>()?;
    }
    Ok(detail)
}
