//! Deriving a root's status from its children.

use std::collections::HashSet;
use std::hash::Hash;

use chrono::{DateTime, Utc};

use crate::lifecycle::stamp_status_change;
use crate::request::DeliveryRequest;
use crate::status::{AdminStatus, DeliveryStatus};

/// The single distinct value of `values`, or `current` when they disagree
/// (or there are none).
pub fn aggregate<T, I>(values: I, current: T) -> T
where
    T: Copy + Eq + Hash,
    I: IntoIterator<Item = T>,
{
    let distinct: HashSet<T> = values.into_iter().collect();
    match distinct.into_iter().collect::<Vec<_>>().as_slice() {
        [only] => *only,
        _ => current,
    }
}

fn live(children: &[DeliveryRequest]) -> impl Iterator<Item = &DeliveryRequest> {
    children.iter().filter(|c| !c.is_deleted())
}

pub fn status_from_children(children: &[DeliveryRequest], current: DeliveryStatus) -> DeliveryStatus {
    aggregate(live(children).map(|c| c.status), current)
}

pub fn admin_status_from_children(
    children: &[DeliveryRequest],
    current: Option<AdminStatus>,
) -> Option<AdminStatus> {
    aggregate(live(children).map(|c| c.admin_status), current)
}

/// Requested stock still on its way: children that are neither cancelled nor deleted.
pub fn stock_from_children(children: &[DeliveryRequest]) -> u64 {
    children
        .iter()
        .filter(|c| !matches!(c.status, DeliveryStatus::Cancelled | DeliveryStatus::Deleted))
        .map(|c| c.total_stock)
        .sum()
}

/// Values a root should hold given its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentTransition {
    pub status: DeliveryStatus,
    pub admin_status: Option<AdminStatus>,
    pub total_stock: u64,
}

impl ParentTransition {
    fn of(parent: &DeliveryRequest) -> Self {
        Self {
            status: parent.status,
            admin_status: parent.admin_status,
            total_stock: parent.total_stock,
        }
    }
}

/// Plan the write that brings `parent` in line with `children`.
///
/// Returns `None` when the parent already holds the derived values, which
/// makes re-running the aggregation a no-op.
pub fn plan_parent_transition(
    parent: &DeliveryRequest,
    children: &[DeliveryRequest],
) -> Option<ParentTransition> {
    let status = status_from_children(children, parent.status);
    let mut admin_status = admin_status_from_children(children, parent.admin_status);

    // A parent released into pending leaves the draft review stage with it.
    if status == DeliveryStatus::Pending && admin_status == Some(AdminStatus::Draft) {
        admin_status = Some(AdminStatus::NewRequest);
    }

    let planned = ParentTransition {
        status,
        admin_status,
        total_stock: stock_from_children(children),
    };
    (planned != ParentTransition::of(parent)).then_some(planned)
}

/// Write a planned transition onto the parent, stamping the entered status.
pub fn apply_parent_transition(
    parent: &mut DeliveryRequest,
    transition: ParentTransition,
    now: DateTime<Utc>,
) {
    let previous = parent.status;
    parent.status = transition.status;
    parent.admin_status = transition.admin_status;
    parent.total_stock = transition.total_stock;
    stamp_status_change(parent, previous, now);
    parent.updated_at = now;
}

/// A root whose children are all gone (or deleted) should itself be deleted.
pub fn parent_should_be_deleted(parent: &DeliveryRequest, children: &[DeliveryRequest]) -> bool {
    !parent.is_deleted() && live(children).next().is_none()
}
