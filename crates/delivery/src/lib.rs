//! `intake-delivery` — the delivery-request lifecycle, free of storage.
//!
//! A supplier stages product intake as a tree: one root per batch, one child
//! per product. Each node carries a supplier-facing `status` and an
//! operator-facing `admin_status`. This crate owns the rules that move a node
//! between states and that derive a root's state from its children; the
//! infrastructure crate loads rows, applies these rules inside a transaction
//! and publishes the resulting events.

pub mod aggregation;
pub mod detail;
pub mod event;
pub mod input;
pub mod lifecycle;
pub mod merge;
pub mod request;
pub mod status;

pub use aggregation::{ParentTransition, apply_parent_transition, parent_should_be_deleted, plan_parent_transition};
pub use detail::{DeliveryRequestDetail, ProductDetail, decorate};
pub use event::{DeliveryRequestEvent, MailFormat, Notification, RequestRef};
pub use input::{
    AddStockInput, CreateDeliveryRequest, NewDeliveryItem, ProductInput, ProductUpdateInput,
    UpdateDeliveryRequest, VariantInput, total_requested, validate_batch,
};
pub use lifecycle::{UpdateOutcome, apply_update};
pub use request::{
    DEFAULT_DISPLAY_CODE_WIDTH, DeliveryRequest, DeliveryRequestHistory, DeliveryRequestVariant,
    RequestVariantKey, checked_quantity,
};
pub use status::{AdminStatus, DeliveryStatus};
