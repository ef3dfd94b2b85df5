use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use intake_catalog::{Customer, Product, ProductVariant, ShippingProfile, Store};
use intake_core::{DeliveryRequestId, Entity, HistoryId};
use intake_delivery::{
    DeliveryRequest, DeliveryRequestHistory, DeliveryRequestVariant, RequestVariantKey,
};

use super::{
    DeliveryRequestFilter, HistoryFilter, ParentSelector, Repository, RequestVariantFilter,
};
use crate::error::StoreError;

/// Delivery requests plus the parent-to-children index.
#[derive(Debug, Clone, Default)]
pub struct RequestTable {
    rows: HashMap<DeliveryRequestId, DeliveryRequest>,
    children: HashMap<DeliveryRequestId, Vec<DeliveryRequestId>>,
    last_display_id: u64,
}

impl RequestTable {
    /// Next value of the display-id sequence (starts at 1, never reused).
    pub fn next_display_id(&mut self) -> u64 {
        self.last_display_id += 1;
        self.last_display_id
    }

    /// Insert a new row; fails if the id is taken.
    pub fn insert(&mut self, row: DeliveryRequest) -> Result<DeliveryRequest, StoreError> {
        if self.rows.contains_key(&row.id) {
            return Err(StoreError::DuplicateKey(format!("delivery request {}", row.id)));
        }
        self.save(row)
    }

    /// Every child of `parent_id` regardless of status, ordered by rank then display id.
    pub fn children_of(&self, parent_id: DeliveryRequestId) -> Vec<DeliveryRequest> {
        let mut children: Vec<DeliveryRequest> = self
            .children
            .get(&parent_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.rows.get(id).cloned())
            .collect();
        sort_siblings(&mut children);
        children
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn unlink(&mut self, row: &DeliveryRequest) {
        if let Some(parent_id) = row.parent_id {
            if let Some(siblings) = self.children.get_mut(&parent_id) {
                siblings.retain(|id| *id != row.id);
            }
        }
    }
}

fn sort_siblings(rows: &mut [DeliveryRequest]) {
    rows.sort_by(|a, b| a.rank.cmp(&b.rank).then(a.display_id.cmp(&b.display_id)));
}

impl Repository<DeliveryRequest> for RequestTable {
    type Filter = DeliveryRequestFilter;

    fn find(&self, filter: &DeliveryRequestFilter) -> Vec<DeliveryRequest> {
        if let ParentSelector::ChildrenOf(parent_id) = filter.parent {
            return self
                .children_of(parent_id)
                .into_iter()
                .filter(|row| filter.matches(row))
                .collect();
        }

        let mut rows: Vec<DeliveryRequest> = match &filter.ids {
            Some(ids) => ids.iter().filter_map(|id| self.rows.get(id)).cloned().collect(),
            None => self.rows.values().cloned().collect(),
        };
        rows.retain(|row| filter.matches(row));
        rows.sort_by_key(|row| row.display_id);
        rows
    }

    fn get(&self, id: &DeliveryRequestId) -> Option<DeliveryRequest> {
        self.rows.get(id).cloned()
    }

    fn save(&mut self, row: DeliveryRequest) -> Result<DeliveryRequest, StoreError> {
        if let Some(parent_id) = row.parent_id {
            if parent_id == row.id || !self.rows.contains_key(&parent_id) {
                return Err(StoreError::UnknownParent(parent_id.to_string()));
            }
        }

        let previous = self.rows.insert(row.id, row.clone());
        match previous {
            Some(old) if old.parent_id == row.parent_id => {}
            Some(old) => {
                self.unlink(&old);
                self.link(&row);
            }
            None => self.link(&row),
        }
        Ok(row)
    }

    fn delete(&mut self, id: &DeliveryRequestId) -> bool {
        match self.rows.remove(id) {
            Some(row) => {
                self.unlink(&row);
                self.children.remove(id);
                true
            }
            None => false,
        }
    }
}

impl RequestTable {
    fn link(&mut self, row: &DeliveryRequest) {
        if let Some(parent_id) = row.parent_id {
            self.children.entry(parent_id).or_default().push(row.id);
        }
    }
}

/// Links between child requests and product variants.
#[derive(Debug, Clone, Default)]
pub struct RequestVariantTable {
    rows: BTreeMap<RequestVariantKey, DeliveryRequestVariant>,
}

impl RequestVariantTable {
    /// Remove every link matching `filter`; returns how many were removed.
    pub fn delete_many(&mut self, filter: &RequestVariantFilter) -> usize {
        let before = self.rows.len();
        self.rows.retain(|_, row| !filter.matches(row));
        before - self.rows.len()
    }
}

impl Repository<DeliveryRequestVariant> for RequestVariantTable {
    type Filter = RequestVariantFilter;

    fn find(&self, filter: &RequestVariantFilter) -> Vec<DeliveryRequestVariant> {
        self.rows
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect()
    }

    fn get(&self, id: &RequestVariantKey) -> Option<DeliveryRequestVariant> {
        self.rows.get(id).cloned()
    }

    fn save(&mut self, row: DeliveryRequestVariant) -> Result<DeliveryRequestVariant, StoreError> {
        self.rows.insert(row.id(), row.clone());
        Ok(row)
    }

    fn delete(&mut self, id: &RequestVariantKey) -> bool {
        self.rows.remove(id).is_some()
    }
}

/// Append-only audit snapshots.
#[derive(Debug, Clone, Default)]
pub struct HistoryTable {
    rows: HashMap<HistoryId, DeliveryRequestHistory>,
}

impl Repository<DeliveryRequestHistory> for HistoryTable {
    type Filter = HistoryFilter;

    /// Newest first.
    fn find(&self, filter: &HistoryFilter) -> Vec<DeliveryRequestHistory> {
        let mut rows: Vec<DeliveryRequestHistory> = self
            .rows
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows
    }

    fn get(&self, id: &HistoryId) -> Option<DeliveryRequestHistory> {
        self.rows.get(id).cloned()
    }

    fn save(&mut self, row: DeliveryRequestHistory) -> Result<DeliveryRequestHistory, StoreError> {
        if self.rows.contains_key(&row.id) {
            return Err(StoreError::DuplicateKey(format!("history {}", row.id)));
        }
        self.rows.insert(row.id, row.clone());
        Ok(row)
    }

    fn delete(&mut self, id: &HistoryId) -> bool {
        self.rows.remove(id).is_some()
    }
}

/// Keyed storage for catalog rows owned by collaborators.
#[derive(Debug, Clone)]
pub struct EntityTable<T: Entity> {
    rows: HashMap<T::Id, T>,
}

impl<T: Entity> Default for EntityTable<T> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }
}

impl<T> EntityTable<T>
where
    T: Entity + Clone,
    T::Id: Hash,
{
    pub fn get(&self, id: &T::Id) -> Option<&T> {
        self.rows.get(id)
    }

    pub fn get_mut(&mut self, id: &T::Id) -> Option<&mut T> {
        self.rows.get_mut(id)
    }

    pub fn upsert(&mut self, row: T) {
        self.rows.insert(row.id(), row);
    }

    pub fn remove(&mut self, id: &T::Id) -> Option<T> {
        self.rows.remove(id)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }
}

/// Every table the delivery workflow touches, committed together.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub requests: RequestTable,
    pub request_variants: RequestVariantTable,
    pub history: HistoryTable,
    pub products: EntityTable<Product>,
    pub variants: EntityTable<ProductVariant>,
    pub stores: EntityTable<Store>,
    pub customers: EntityTable<Customer>,
    pub shipping_profiles: EntityTable<ShippingProfile>,
}
