//! Payload shapes dispatched through the `Notifier` abstract interface. These describe what goes
//! out, not how; delivery is handled by an external collaborator.

use crate::ids::{OrderId, OwnerId};
use crate::payload::Payload;
use serde::Serialize;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderCompleted,
    OrderCancelled,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::OrderCompleted => "order_completed",
            NotificationKind::OrderCancelled => "order_cancelled",
        }
    }
}

/// Recipient class/key for a notification addressed to a player. Other recipient classes are
/// reserved for future use but unused by this core.
pub fn user_recipient(owner_id: OwnerId) -> (&'static str, String) {
    ("user", owner_id.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderCompletedPayload {
    pub order_id: OrderId,
    pub give_name: String,
    /// Unit price from this side's perspective, i.e. this order's `give_amount`.
    pub give_amount: i64,
    pub give_payload: Payload,
    pub take_name: String,
    pub take_amount: i64,
    pub take_payload: Payload,
    /// How many units were filled by this event.
    pub amount_completed: i64,
    /// Remaining `available` on the order after this event (0 if it was deleted).
    pub amount_left: i64,
    /// The order's opaque metadata payload, echoed back verbatim.
    pub payload: Payload,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderCancelledPayload {
    pub order_id: OrderId,
    pub give_name: String,
    pub give_amount: i64,
    pub give_payload: Payload,
    pub take_name: String,
    pub take_amount: i64,
    pub take_payload: Payload,
    /// `available` at the moment of cancellation.
    pub were_available: i64,
    /// The order's opaque metadata payload, echoed back verbatim.
    pub payload: Payload,
}
