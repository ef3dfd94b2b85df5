//! Delivery Request Store.
//!
//! Rows live in plain tables addressed by id. The request tree is an
//! adjacency list: each request names its parent, and the request table keeps
//! a parent-to-children index in sync on every write. Tree walks go back
//! through the table by id, never through object references.

pub mod in_memory;
pub mod query;
pub mod tables;

use serde::{Deserialize, Serialize};

use intake_core::{DeliveryRequestId, Entity, ProductId, StoreId, VariantId};
use intake_delivery::{DeliveryRequest, DeliveryRequestHistory, DeliveryRequestVariant, DeliveryStatus};

use crate::error::StoreError;

pub use in_memory::{InMemoryDatabase, Transaction};
pub use query::{Page, Pagination};
pub use tables::{EntityTable, HistoryTable, RequestTable, RequestVariantTable, Tables};

/// Storage contract for one entity type.
pub trait Repository<T: Entity> {
    /// Query value understood by this repository.
    type Filter;

    /// Every row matching `filter`, in the repository's natural order.
    fn find(&self, filter: &Self::Filter) -> Vec<T>;

    fn find_one(&self, filter: &Self::Filter) -> Option<T> {
        self.find(filter).into_iter().next()
    }

    fn get(&self, id: &T::Id) -> Option<T>;

    /// Insert or replace the row with the same id.
    fn save(&mut self, row: T) -> Result<T, StoreError>;

    /// Physically remove a row. Returns whether it existed.
    fn delete(&mut self, id: &T::Id) -> bool;
}

/// Which part of the tree a request query looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum ParentSelector {
    #[default]
    Any,
    Roots,
    ChildrenOf(DeliveryRequestId),
}

/// Query over delivery requests.
///
/// Deleted rows are excluded unless `statuses` is given or `include_deleted`
/// is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequestFilter {
    pub ids: Option<Vec<DeliveryRequestId>>,
    pub store_id: Option<StoreId>,
    #[serde(default)]
    pub parent: ParentSelector,
    pub product_id: Option<ProductId>,
    pub display_id: Option<u64>,
    pub statuses: Option<Vec<DeliveryStatus>>,
    #[serde(default)]
    pub include_deleted: bool,
}

impl DeliveryRequestFilter {
    pub fn by_id(id: DeliveryRequestId) -> Self {
        Self {
            ids: Some(vec![id]),
            ..Self::default()
        }
    }

    pub fn children_of(parent_id: DeliveryRequestId) -> Self {
        Self {
            parent: ParentSelector::ChildrenOf(parent_id),
            ..Self::default()
        }
    }

    pub fn with_statuses(mut self, statuses: impl Into<Vec<DeliveryStatus>>) -> Self {
        self.statuses = Some(statuses.into());
        self
    }

    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn matches(&self, row: &DeliveryRequest) -> bool {
        let status_ok = match &self.statuses {
            Some(statuses) => statuses.contains(&row.status),
            None => self.include_deleted || !row.is_deleted(),
        };
        let parent_ok = match self.parent {
            ParentSelector::Any => true,
            ParentSelector::Roots => row.is_root(),
            ParentSelector::ChildrenOf(parent_id) => row.parent_id == Some(parent_id),
        };

        status_ok
            && parent_ok
            && self.ids.as_ref().is_none_or(|ids| ids.contains(&row.id))
            && self.store_id.is_none_or(|s| s == row.store_id)
            && self.product_id.is_none_or(|p| row.product_id == Some(p))
            && self.display_id.is_none_or(|d| d == row.display_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVariantFilter {
    pub delivery_request_id: Option<DeliveryRequestId>,
    pub variant_id: Option<VariantId>,
}

impl RequestVariantFilter {
    pub fn for_request(id: DeliveryRequestId) -> Self {
        Self {
            delivery_request_id: Some(id),
            variant_id: None,
        }
    }

    pub fn matches(&self, row: &DeliveryRequestVariant) -> bool {
        self.delivery_request_id
            .is_none_or(|id| id == row.delivery_request_id)
            && self.variant_id.is_none_or(|id| id == row.variant_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub delivery_request_id: Option<DeliveryRequestId>,
}

impl HistoryFilter {
    pub fn matches(&self, row: &DeliveryRequestHistory) -> bool {
        self.delivery_request_id
            .is_none_or(|id| id == row.delivery_request_id)
    }
}
