//! Catalog data owned by external collaborators.
//!
//! Products, variants, stores, customers and shipping profiles are managed
//! elsewhere; the delivery workflow only reads and patches them through the
//! collaborator contracts in `intake-infra`. This crate holds their plain data
//! shapes plus the small amount of patch logic every implementation shares.

pub mod product;
pub mod store;

pub use product::{
    Money, NewProduct, NewVariant, Product, ProductPatch, ProductStatus, ProductVariant,
    VariantPatch,
};
pub use store::{Customer, ShippingProfile, Store, StoreDetail};
