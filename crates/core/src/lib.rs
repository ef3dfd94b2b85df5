//! `intake-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! the error taxonomy shared by every layer, strongly-typed identifiers and the
//! `Entity` trait repositories are keyed on.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    DeliveryRequestId, HistoryId, ProductId, ShippingProfileId, StoreId, UserId, VariantId,
};
