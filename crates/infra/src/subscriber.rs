//! Delivery Request Subscriber: keeps roots consistent with their children.
//!
//! Runs out of band, driven by bus events. Every handler re-derives the
//! root's values from the children's current state instead of applying a
//! delta, so duplicate or out-of-order deliveries only delay convergence.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use intake_core::DeliveryRequestId;
use intake_delivery::{
    AdminStatus, DeliveryRequestEvent, MailFormat, ParentTransition, apply_parent_transition,
    event::{DELETED, STATUS_CHANGE_TRIGGERS},
    lifecycle::mark_deleted,
    parent_should_be_deleted, plan_parent_transition,
};
use intake_events::{EventBus, HandlerRegistry};

use crate::error::{ServiceError, ServiceResult};
use crate::service::{DeliveryRequestEnvelope, publish_all};
use crate::store::{InMemoryDatabase, Repository, Transaction};

pub struct DeliveryRequestSubscriber<B> {
    db: Arc<InMemoryDatabase>,
    bus: B,
}

impl<B> DeliveryRequestSubscriber<B>
where
    B: EventBus<DeliveryRequestEnvelope> + 'static,
{
    pub fn new(db: Arc<InMemoryDatabase>, bus: B) -> Self {
        Self { db, bus }
    }

    /// Dispatch table for the worker loop.
    pub fn registry(self: &Arc<Self>) -> HandlerRegistry<DeliveryRequestEnvelope, ServiceError> {
        let mut registry: HandlerRegistry<DeliveryRequestEnvelope, ServiceError> =
            HandlerRegistry::new();

        let subscriber = Arc::clone(self);
        registry.register_all(&STATUS_CHANGE_TRIGGERS, move |envelope| {
            subscriber.on_status_change(envelope.payload().request_id())
        });

        let subscriber = Arc::clone(self);
        registry.register(DELETED, move |envelope| {
            subscriber.on_deleted(envelope.payload().request_id())
        });

        registry
    }

    fn on_status_change(&self, id: DeliveryRequestId) -> ServiceResult<()> {
        let Some(request) = self.db.read(|t| t.requests.get(&id))? else {
            debug!(delivery_request_id = %id, "event for unknown delivery request ignored");
            return Ok(());
        };
        if request.is_root() {
            self.handle_status_change_parent(id)?;
        } else {
            self.handle_status_change(id)?;
        }
        Ok(())
    }

    fn on_deleted(&self, id: DeliveryRequestId) -> ServiceResult<()> {
        let Some(request) = self.db.read(|t| t.requests.get(&id))? else {
            debug!(delivery_request_id = %id, "delete event for removed delivery request ignored");
            return Ok(());
        };
        self.handle_status_delete_child(request.parent_id.unwrap_or(request.id))?;
        Ok(())
    }

    /// Re-aggregate the parent of `child_id`.
    pub fn handle_status_change(&self, child_id: DeliveryRequestId) -> ServiceResult<Option<ParentTransition>> {
        let (transition, events) = self.db.transaction(|tx: &mut Transaction| -> ServiceResult<_> {
            let child = tx
                .requests
                .get(&child_id)
                .ok_or_else(|| ServiceError::not_found(format!("delivery request {child_id}")))?;
            let parent_id = child.parent_id.ok_or_else(|| {
                ServiceError::invalid_data(format!("delivery request {child_id} has no parent"))
            })?;
            reaggregate(tx, parent_id)
        })?;
        publish_all(&self.bus, events)?;
        Ok(transition)
    }

    /// Re-aggregate a root directly.
    pub fn handle_status_change_parent(
        &self,
        root_id: DeliveryRequestId,
    ) -> ServiceResult<Option<ParentTransition>> {
        let (transition, events) =
            self.db.transaction(|tx: &mut Transaction| -> ServiceResult<_> { reaggregate(tx, root_id) })?;
        publish_all(&self.bus, events)?;
        Ok(transition)
    }

    /// After a child delete: a root left without live children is deleted too.
    pub fn handle_status_delete_child(&self, root_id: DeliveryRequestId) -> ServiceResult<bool> {
        let (deleted, _) = self.db.transaction(|tx: &mut Transaction| -> ServiceResult<bool> {
            let Some(mut root) = tx.requests.get(&root_id) else {
                return Ok(false);
            };
            let children = tx.requests.children_of(root_id);
            if !parent_should_be_deleted(&root, &children) {
                debug!(delivery_request_id = %root_id, "root keeps live children");
                return Ok(false);
            }

            mark_deleted(&mut root, Utc::now());
            tx.requests.save(root)?;
            info!(delivery_request_id = %root_id, "root without live children deleted");
            Ok(true)
        })?;
        Ok(deleted)
    }
}

/// Bring `parent_id` in line with its children. No write when it already is.
///
/// A root entering `Published` announces it with a parent-level notification.
fn reaggregate(tx: &mut Transaction, parent_id: DeliveryRequestId) -> ServiceResult<Option<ParentTransition>> {
    let mut parent = tx
        .requests
        .get(&parent_id)
        .ok_or_else(|| ServiceError::not_found(format!("delivery request {parent_id}")))?;
    if parent.is_deleted() {
        debug!(delivery_request_id = %parent_id, "deleted root is not re-aggregated");
        return Ok(None);
    }

    let children = tx.requests.children_of(parent_id);
    let Some(transition) = plan_parent_transition(&parent, &children) else {
        debug!(delivery_request_id = %parent_id, "root already consistent with its children");
        return Ok(None);
    };

    let now = Utc::now();
    let was_published = parent.admin_status == Some(AdminStatus::Published);
    apply_parent_transition(&mut parent, transition, now);
    let now_published = parent.admin_status == Some(AdminStatus::Published);
    tx.requests.save(parent)?;
    if now_published && !was_published {
        tx.emit(DeliveryRequestEvent::notification(parent_id, MailFormat::Published, true, now));
    }
    info!(
        delivery_request_id = %parent_id,
        status = %transition.status,
        admin_status = ?transition.admin_status,
        total_stock = transition.total_stock,
        "root re-aggregated"
    );
    Ok(Some(transition))
}
