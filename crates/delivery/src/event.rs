//! Typed lifecycle events published on the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use intake_core::DeliveryRequestId;
use intake_events::Event;

use crate::lifecycle::UpdateOutcome;
use crate::status::{AdminStatus, DeliveryStatus};

pub const CREATED: &str = "delivery_request.created";
pub const UPDATED: &str = "delivery_request.updated";
pub const CANCELED: &str = "delivery_request.canceled";
pub const DELETED: &str = "delivery_request.deleted";
pub const DELIVERED: &str = "delivery_request.delivered";
pub const SEND_MAIL: &str = "delivery_request.send_mail";
pub const QUANTITY_CONFIRM: &str = "delivery_request.quantity_confirm";
pub const ARRIVED: &str = "delivery_request.arrived";
pub const PUBLISHED: &str = "delivery_request.published";

/// Child events after which the parent is re-aggregated. `DELETED` is routed
/// separately since it may remove the parent instead.
pub const STATUS_CHANGE_TRIGGERS: [&str; 3] = [CREATED, UPDATED, CANCELED];

/// Template the notification renderer should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailFormat {
    NewRequest,
    QuantityConfirm,
    Arrived,
    Delivered,
    Published,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRef {
    pub id: DeliveryRequestId,
    pub occurred_at: DateTime<Utc>,
}

/// Payload consumed by the external email renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: DeliveryRequestId,
    pub format: MailFormat,
    pub is_parent: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryRequestEvent {
    Created(RequestRef),
    Updated(RequestRef),
    Canceled(RequestRef),
    Deleted(RequestRef),
    Delivered(Notification),
    SendMail(Notification),
    QuantityConfirm(Notification),
    Arrived(Notification),
    Published(Notification),
}

impl DeliveryRequestEvent {
    pub fn created(id: DeliveryRequestId, occurred_at: DateTime<Utc>) -> Self {
        Self::Created(RequestRef { id, occurred_at })
    }

    pub fn updated(id: DeliveryRequestId, occurred_at: DateTime<Utc>) -> Self {
        Self::Updated(RequestRef { id, occurred_at })
    }

    pub fn canceled(id: DeliveryRequestId, occurred_at: DateTime<Utc>) -> Self {
        Self::Canceled(RequestRef { id, occurred_at })
    }

    pub fn deleted(id: DeliveryRequestId, occurred_at: DateTime<Utc>) -> Self {
        Self::Deleted(RequestRef { id, occurred_at })
    }

    pub fn notification(
        id: DeliveryRequestId,
        format: MailFormat,
        is_parent: bool,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let payload = Notification {
            id,
            format,
            is_parent,
            occurred_at,
        };
        match format {
            MailFormat::NewRequest => Self::SendMail(payload),
            MailFormat::QuantityConfirm => Self::QuantityConfirm(payload),
            MailFormat::Arrived => Self::Arrived(payload),
            MailFormat::Delivered => Self::Delivered(payload),
            MailFormat::Published => Self::Published(payload),
        }
    }

    /// Notifications owed to the supplier after an update.
    pub fn notifications_for(outcome: &UpdateOutcome, occurred_at: DateTime<Utc>) -> Vec<Self> {
        let request = &outcome.request;
        let mut formats = Vec::new();
        if outcome.submitted() {
            formats.push(MailFormat::NewRequest);
        }
        if outcome.admin_status_changed_to(AdminStatus::QuantityConfirm) {
            formats.push(MailFormat::QuantityConfirm);
        }
        if outcome.newly_arrived() {
            formats.push(MailFormat::Arrived);
        }
        if outcome.status_changed_to(DeliveryStatus::Delivered) {
            formats.push(MailFormat::Delivered);
        }
        formats
            .into_iter()
            .map(|format| Self::notification(request.id, format, request.is_root(), occurred_at))
            .collect()
    }

    /// The request the event is about.
    pub fn request_id(&self) -> DeliveryRequestId {
        match self {
            Self::Created(r) | Self::Updated(r) | Self::Canceled(r) | Self::Deleted(r) => r.id,
            Self::Delivered(n)
            | Self::SendMail(n)
            | Self::QuantityConfirm(n)
            | Self::Arrived(n)
            | Self::Published(n) => n.id,
        }
    }
}

impl Event for DeliveryRequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Created(_) => CREATED,
            Self::Updated(_) => UPDATED,
            Self::Canceled(_) => CANCELED,
            Self::Deleted(_) => DELETED,
            Self::Delivered(_) => DELIVERED,
            Self::SendMail(_) => SEND_MAIL,
            Self::QuantityConfirm(_) => QUANTITY_CONFIRM,
            Self::Arrived(_) => ARRIVED,
            Self::Published(_) => PUBLISHED,
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::Created(r) | Self::Updated(r) | Self::Canceled(r) | Self::Deleted(r) => {
                r.occurred_at
            }
            Self::Delivered(n)
            | Self::SendMail(n)
            | Self::QuantityConfirm(n)
            | Self::Arrived(n)
            | Self::Published(n) => n.occurred_at,
        }
    }
}
