//! Infrastructure layer: the delivery-request store, services, subscriber and workers.
//!
//! Pure lifecycle rules live in `intake-delivery`; this crate loads rows,
//! applies those rules inside transactions, talks to the catalog
//! collaborators and moves events across the bus.

pub mod assembly;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod history;
pub mod search;
pub mod service;
pub mod store;
pub mod subscriber;
pub mod workers;

pub use assembly::RetrieveOptions;
pub use config::IntakeConfig;
pub use error::{ServiceError, ServiceResult, StoreError};
pub use history::{DeliveryRequestHistoryService, HistoryEntry};
pub use search::{DeliveryRequestSearchService, SearchQuery, SearchRow, StoreSummary};
pub use service::{DeliveryRequestEnvelope, DeliveryRequestService};
pub use subscriber::DeliveryRequestSubscriber;

#[cfg(test)]
mod integration_tests;
