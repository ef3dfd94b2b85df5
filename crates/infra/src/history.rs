//! Delivery Request History Service: "before" images of privileged changes.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

use intake_auth::{Action, Principal, authorize};
use intake_catalog::Customer;
use intake_core::{DeliveryRequestId, HistoryId, UserId};
use intake_delivery::{DeliveryRequest, DeliveryRequestHistory};

use crate::assembly::{RetrieveOptions, load_detail};
use crate::collaborators::ProductService;
use crate::error::{ServiceError, ServiceResult, StoreError};
use crate::store::{HistoryFilter, InMemoryDatabase, Page, Pagination, Repository, Tables};

/// A history row with its creator and target expanded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub history: DeliveryRequestHistory,
    /// `None` when the acting user is not a known customer (e.g. an operator).
    pub creator: Option<Customer>,
    pub target: DeliveryRequest,
}

pub struct DeliveryRequestHistoryService {
    db: Arc<InMemoryDatabase>,
    products: Arc<dyn ProductService>,
}

impl DeliveryRequestHistoryService {
    pub fn new(db: Arc<InMemoryDatabase>, products: Arc<dyn ProductService>) -> Self {
        Self { db, products }
    }

    /// Snapshot `id` inside an open transaction.
    ///
    /// With `is_parent` the whole subtree is captured (children, their products
    /// and variants); otherwise the request with its own product. The
    /// snapshot's top-level `id` is stripped.
    pub fn create_snapshot(
        &self,
        tx: &mut Tables,
        created_by: UserId,
        id: DeliveryRequestId,
        is_parent: bool,
    ) -> ServiceResult<DeliveryRequestHistory> {
        let request = tx
            .requests
            .get(&id)
            .ok_or_else(|| ServiceError::not_found(format!("delivery request {id}")))?;

        let options = RetrieveOptions {
            with_children: is_parent,
            ..RetrieveOptions::full()
        };
        let detail = load_detail(tx, self.products.as_ref(), request, options)?;

        let mut metadata = serde_json::to_value(&detail).map_err(StoreError::from)?;
        if let JsonValue::Object(map) = &mut metadata {
            map.remove("id");
        }

        let history = tx.history.save(DeliveryRequestHistory {
            id: HistoryId::new(),
            delivery_request_id: id,
            created_by,
            metadata,
            created_at: Utc::now(),
        })?;
        info!(
            delivery_request_id = %id,
            history_id = %history.id,
            user_id = %created_by,
            is_parent,
            "delivery request snapshot recorded"
        );
        Ok(history)
    }

    /// Snapshot `id` in its own transaction.
    pub fn create(
        &self,
        created_by: UserId,
        id: DeliveryRequestId,
        is_parent: bool,
    ) -> ServiceResult<DeliveryRequestHistory> {
        let (history, _) = self
            .db
            .transaction(|tx| self.create_snapshot(tx, created_by, id, is_parent))?;
        Ok(history)
    }

    /// Snapshots of `id`, newest first.
    pub fn list_history(
        &self,
        principal: &Principal,
        id: DeliveryRequestId,
        pagination: Pagination,
    ) -> ServiceResult<Page<DeliveryRequestHistory>> {
        self.db.read(|tables| {
            let target = tables
                .requests
                .get(&id)
                .ok_or_else(|| ServiceError::not_found(format!("delivery request {id}")))?;
            authorize(principal, Action::Read, target.store_id)?;

            let rows = tables.history.find(&HistoryFilter {
                delivery_request_id: Some(id),
            });
            Ok(Page::paginate(rows, pagination))
        })?
    }

    pub fn get_one(&self, principal: &Principal, history_id: HistoryId) -> ServiceResult<HistoryEntry> {
        self.db.read(|tables| {
            let history = tables
                .history
                .get(&history_id)
                .ok_or_else(|| ServiceError::not_found(format!("history {history_id}")))?;
            let target = tables.requests.get(&history.delivery_request_id).ok_or_else(|| {
                ServiceError::not_found(format!("delivery request {}", history.delivery_request_id))
            })?;
            authorize(principal, Action::Read, target.store_id)?;

            let creator = tables.customers.get(&history.created_by).cloned();
            Ok(HistoryEntry {
                history,
                creator,
                target,
            })
        })?
    }
}
