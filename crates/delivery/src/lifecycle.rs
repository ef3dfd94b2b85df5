//! Transition rules for a single request.
//!
//! Everything here is pure: callers load the row, apply a rule and persist the
//! result inside their own transaction.

use chrono::{DateTime, Utc};

use intake_core::{DomainError, DomainResult};

use crate::input::UpdateDeliveryRequest;
use crate::request::DeliveryRequest;
use crate::status::{AdminStatus, DeliveryStatus};

/// Result of merging an update over a stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub request: DeliveryRequest,
    pub previous: DeliveryRequest,
}

impl UpdateOutcome {
    /// The admin just marked arrival. Guards inventory application.
    pub fn newly_arrived(&self) -> bool {
        self.previous.admin_status != Some(AdminStatus::Arrived)
            && self.request.admin_status == Some(AdminStatus::Arrived)
    }

    /// Draft to pending: the supplier submitted the request.
    pub fn submitted(&self) -> bool {
        self.previous.status == DeliveryStatus::Draft
            && self.request.status == DeliveryStatus::Pending
    }

    pub fn status_changed_to(&self, status: DeliveryStatus) -> bool {
        self.previous.status != status && self.request.status == status
    }

    pub fn admin_status_changed_to(&self, admin_status: AdminStatus) -> bool {
        self.previous.admin_status != Some(admin_status)
            && self.request.admin_status == Some(admin_status)
    }
}

/// Merge `patch` over `current` and apply the update rules.
///
/// Rules are applied in order:
/// 1. an unset `admin_status` defaults to `draft`;
/// 2. draft to pending resets `created_at` and forces `new_request`;
/// 3. entering pending stamps `released_at` if it was never set;
/// 4. a pending patch always forces `new_request`;
/// 5. `arrived` forces `status = delivered`.
pub fn apply_update(
    current: &DeliveryRequest,
    patch: &UpdateDeliveryRequest,
    now: DateTime<Utc>,
) -> UpdateOutcome {
    let mut next = current.clone();

    if let Some(rank) = patch.rank {
        next.rank = rank;
    }
    if let Some(price) = patch.suggested_price {
        next.suggested_price = Some(price);
    }
    if let Some(background_type) = &patch.background_type {
        next.background_type = Some(background_type.clone());
    }
    if let Some(shooting) = &patch.shooting {
        next.shooting = Some(shooting.clone());
    }
    if let Some(metadata) = &patch.metadata {
        next.metadata
            .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if let Some(status) = patch.status {
        next.status = status;
    }
    if let Some(admin_status) = patch.admin_status {
        next.admin_status = Some(admin_status);
    }

    // TODO: confirm with product owners whether legacy rows without an admin
    // status should really fall back to draft when their status is not draft.
    if current.admin_status.is_none() && patch.admin_status.is_none() {
        next.admin_status = Some(AdminStatus::Draft);
    }

    let entering_pending = patch.status == Some(DeliveryStatus::Pending);
    if current.status == DeliveryStatus::Draft && entering_pending {
        next.created_at = now;
        next.admin_status = Some(AdminStatus::NewRequest);
    }
    if entering_pending {
        next.admin_status = Some(AdminStatus::NewRequest);
    }
    if next.admin_status == Some(AdminStatus::Arrived) {
        next.status = DeliveryStatus::Delivered;
    }

    stamp_status_change(&mut next, current.status, now);
    if entering_pending && next.released_at.is_none() {
        next.released_at = Some(now);
    }
    next.updated_at = now;

    UpdateOutcome {
        request: next,
        previous: current.clone(),
    }
}

/// Stamp the timestamp belonging to the status `request` just moved into.
///
/// `released_at` and `delivered_at` are written at most once; the terminal
/// stamps are written on every transition into their status.
pub fn stamp_status_change(
    request: &mut DeliveryRequest,
    previous: DeliveryStatus,
    now: DateTime<Utc>,
) {
    if request.status == previous {
        return;
    }
    match request.status {
        DeliveryStatus::Pending => {
            request.released_at.get_or_insert(now);
        }
        DeliveryStatus::Delivered => {
            request.delivered_at.get_or_insert(now);
        }
        DeliveryStatus::Cancelled => request.canceled_at = Some(now),
        DeliveryStatus::Deleted => request.deleted_at = Some(now),
        DeliveryStatus::Draft => {}
    }
}

/// Only a pending child may be cancelled.
pub fn ensure_cancellable(request: &DeliveryRequest) -> DomainResult<()> {
    if request.is_root() {
        return Err(DomainError::not_allowed(format!(
            "delivery request {} is a root and cannot be cancelled",
            request.id
        )));
    }
    if request.status != DeliveryStatus::Pending {
        return Err(DomainError::not_allowed(format!(
            "delivery request {} is {} and cannot be cancelled",
            request.id, request.status
        )));
    }
    Ok(())
}

pub fn cancel(request: &mut DeliveryRequest, now: DateTime<Utc>) -> DomainResult<()> {
    ensure_cancellable(request)?;
    let previous = request.status;
    request.status = DeliveryStatus::Cancelled;
    request.admin_status = Some(AdminStatus::Cancelled);
    stamp_status_change(request, previous, now);
    request.updated_at = now;
    Ok(())
}

/// Halt a child's review without touching its supplier-facing status.
pub fn stop(request: &mut DeliveryRequest, now: DateTime<Utc>) -> DomainResult<()> {
    if request.is_root() {
        return Err(DomainError::not_allowed(format!(
            "delivery request {} is a root and cannot be stopped",
            request.id
        )));
    }
    request.admin_status = Some(AdminStatus::StopProduct);
    request.updated_at = now;
    Ok(())
}

/// Arrived rows turn their linked quantities into stock once.
pub fn ensure_inventory_pending(request: &DeliveryRequest) -> DomainResult<()> {
    if request.admin_status != Some(AdminStatus::Arrived) {
        return Err(DomainError::not_allowed(format!(
            "delivery request {} has not arrived",
            request.id
        )));
    }
    if request.inventory_applied_at.is_some() {
        return Err(DomainError::not_allowed(format!(
            "inventory for delivery request {} was already applied",
            request.id
        )));
    }
    Ok(())
}

/// Soft delete. Idempotent for rows that are already deleted.
pub fn mark_deleted(request: &mut DeliveryRequest, now: DateTime<Utc>) {
    if request.is_deleted() {
        return;
    }
    let previous = request.status;
    request.status = DeliveryStatus::Deleted;
    request.admin_status = Some(AdminStatus::Deleted);
    stamp_status_change(request, previous, now);
    request.updated_at = now;
}
