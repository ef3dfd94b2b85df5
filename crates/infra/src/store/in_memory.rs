use std::ops::{Deref, DerefMut};
use std::sync::RwLock;

use intake_delivery::DeliveryRequestEvent;

use super::tables::Tables;
use crate::error::StoreError;

/// In-memory transactional database.
///
/// Intended for tests/dev. A transaction works on a private copy of every
/// table and replaces the shared state only when its closure returns `Ok`;
/// on `Err` the copy is dropped and nothing is written. Writers are
/// serialized by the table lock.
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    tables: RwLock<Tables>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` atomically. Returns its value and the events it recorded,
    /// which the caller publishes once the commit is visible.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<(T, Vec<DeliveryRequestEvent>), E>
    where
        F: FnOnce(&mut Transaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut guard = self.tables.write().map_err(|_| StoreError::Poisoned)?;

        let mut tx = Transaction::begin(guard.clone());
        let value = f(&mut tx)?;

        let (tables, outbox) = tx.into_parts();
        *guard = tables;
        Ok((value, outbox))
    }

    /// Consistent read-only view of the committed tables.
    pub fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Tables) -> T,
    {
        let guard = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&guard))
    }
}

/// Working copy of the tables plus the events to publish after commit.
#[derive(Debug)]
pub struct Transaction {
    tables: Tables,
    outbox: Vec<DeliveryRequestEvent>,
}

impl Transaction {
    fn begin(tables: Tables) -> Self {
        Self {
            tables,
            outbox: Vec::new(),
        }
    }

    /// Record an event; it is published only if the transaction commits.
    pub fn emit(&mut self, event: DeliveryRequestEvent) {
        self.outbox.push(event);
    }

    fn into_parts(self) -> (Tables, Vec<DeliveryRequestEvent>) {
        (self.tables, self.outbox)
    }
}

impl Deref for Transaction {
    type Target = Tables;

    fn deref(&self) -> &Tables {
        &self.tables
    }
}

impl DerefMut for Transaction {
    fn deref_mut(&mut self) -> &mut Tables {
        &mut self.tables
    }
}
