//! Delivery Request Search Service: read-only listing of roots for operators.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use intake_auth::{Action, Principal, authorize};
use intake_catalog::Store;
use intake_core::StoreId;
use intake_delivery::{DeliveryRequest, DeliveryStatus};

use crate::config::IntakeConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::store::{DeliveryRequestFilter, InMemoryDatabase, Page, Pagination, ParentSelector, Repository, Tables};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub display_id: Option<u64>,
    /// Inclusive lower bound on `released_at`.
    pub released_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `released_at`.
    pub released_to: Option<DateTime<Utc>>,
    /// Free-text store lookup: id, name, address, phone, company, owner.
    pub store_query: Option<String>,
    /// Deleted roots are hidden unless listed here.
    pub statuses: Option<Vec<DeliveryStatus>>,
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub id: StoreId,
    pub name: String,
    pub company_name: Option<String>,
    pub phone: Option<String>,
}

impl From<&Store> for StoreSummary {
    fn from(store: &Store) -> Self {
        Self {
            id: store.id,
            name: store.name.clone(),
            company_name: store.detail.company_name.clone(),
            phone: store.detail.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRow {
    #[serde(flatten)]
    pub request: DeliveryRequest,
    pub display_code: String,
    pub store: Option<StoreSummary>,
    /// Children that are not deleted.
    pub child_count: usize,
    pub product_titles: Vec<String>,
}

pub struct DeliveryRequestSearchService {
    db: Arc<InMemoryDatabase>,
    config: IntakeConfig,
}

impl DeliveryRequestSearchService {
    pub fn new(db: Arc<InMemoryDatabase>, config: IntakeConfig) -> Self {
        Self { db, config }
    }

    /// Roots matching `query`, newest display id first.
    ///
    /// Store principals only ever see their own store.
    pub fn search(&self, principal: &Principal, query: &SearchQuery) -> ServiceResult<Page<SearchRow>> {
        let scope = if principal.is_admin() {
            None
        } else {
            let store_id = principal
                .store_id
                .ok_or_else(|| ServiceError::not_allowed("principal acts for no store"))?;
            authorize(principal, Action::Read, store_id)?;
            Some(store_id)
        };
        let pagination = query
            .pagination
            .map(|p| self.config.pagination(Some(p.limit), Some(p.offset)))
            .unwrap_or_else(|| self.config.pagination(None, None));

        self.db.read(|tables| {
            let candidate_stores = query
                .store_query
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(|q| resolve_stores(tables, q));

            let filter = DeliveryRequestFilter {
                parent: ParentSelector::Roots,
                display_id: query.display_id,
                store_id: scope,
                statuses: query.statuses.clone(),
                ..Default::default()
            };

            let mut roots: Vec<DeliveryRequest> = tables
                .requests
                .find(&filter)
                .into_iter()
                .filter(|r| candidate_stores.as_ref().is_none_or(|s| s.contains(&r.store_id)))
                .filter(|r| released_within(r, query.released_from, query.released_to))
                .collect();
            roots.sort_by(|a, b| b.display_id.cmp(&a.display_id));

            tracing::debug!(matches = roots.len(), "delivery request search");
            Page::paginate(roots, pagination).map(|root| self.row(tables, root))
        })
        .map_err(Into::into)
    }

    fn row(&self, tables: &Tables, request: DeliveryRequest) -> SearchRow {
        let children: Vec<DeliveryRequest> = tables
            .requests
            .children_of(request.id)
            .into_iter()
            .filter(|c| !c.is_deleted())
            .collect();
        let product_titles = children
            .iter()
            .filter_map(|c| c.product_id)
            .filter_map(|id| tables.products.get(&id))
            .map(|p| p.title.clone())
            .collect();

        SearchRow {
            display_code: request.display_code(self.config.display_code_width),
            store: tables.stores.get(&request.store_id).map(StoreSummary::from),
            child_count: children.len(),
            product_titles,
            request,
        }
    }
}

fn released_within(
    request: &DeliveryRequest,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> bool {
    if from.is_none() && to.is_none() {
        return true;
    }
    request.released_at.is_some_and(|released| {
        from.is_none_or(|from| released >= from) && to.is_none_or(|to| released <= to)
    })
}

/// Stores whose id, name, address, phone, company or owner matches `query`
/// (case-insensitive substring).
fn resolve_stores(tables: &Tables, query: &str) -> HashSet<StoreId> {
    let needle = query.to_lowercase();
    let hit = |value: &str| value.to_lowercase().contains(&needle);

    tables
        .stores
        .values()
        .filter(|store| {
            let detail = &store.detail;
            let owner = store.owner_id.and_then(|id| tables.customers.get(&id));

            hit(&store.id.to_string())
                || hit(&store.name)
                || detail.address_parts().any(hit)
                || [&detail.phone, &detail.company_name]
                    .into_iter()
                    .flatten()
                    .any(|v| hit(v))
                || store.owner_id.is_some_and(|id| hit(&id.to_string()))
                || owner.is_some_and(|o| hit(&o.full_name()) || hit(&o.email))
        })
        .map(|store| store.id)
        .collect()
}
