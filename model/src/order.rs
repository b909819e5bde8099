//! Orders: a standing offer to trade `give_amount` units of `give_item` per `take_amount` units
//! of `take_item`, repeatable up to `available` times.

use crate::ids::{MarketId, OrderId, OwnerId, TenantId};
use crate::payload::{empty_payload, Payload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub order_id: OrderId,
    pub tenant_id: TenantId,
    pub market_id: MarketId,
    pub owner_id: OwnerId,
    pub give_name: String,
    pub give_payload: Payload,
    pub give_amount: i64,
    pub take_name: String,
    pub take_payload: Payload,
    pub take_amount: i64,
    /// How many times this order can still be filled in full.
    pub available: i64,
    /// Arbitrary metadata opaque to the core, echoed back in `order_completed`/`order_cancelled`
    /// notifications and in order queries. Never consulted by the matcher.
    pub payload: Payload,
    pub deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub give_name: String,
    #[serde(default = "empty_payload")]
    pub give_payload: Payload,
    pub give_amount: i64,
    pub take_name: String,
    #[serde(default = "empty_payload")]
    pub take_payload: Payload,
    pub take_amount: i64,
    pub available: i64,
    #[serde(default = "empty_payload")]
    pub payload: Payload,
    pub deadline: DateTime<Utc>,
    /// Escrow `give_amount * available` units of `give_item` out of the owner's balance when
    /// the order is posted. If false the order is posted without any ledger effect.
    #[serde(default = "default_true")]
    pub subtract_items: bool,
}

fn default_true() -> bool {
    true
}

/// Edits an existing order's editable fields in place, with no ledger reconciliation: shrinking
/// `give_amount`/`take_amount`/`available` on an order that already has escrowed items does not
/// refund the difference, and growing them does not demand additional escrow. Callers that need
/// the escrow to track the new terms must cancel and re-post instead.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderUpdate {
    pub give_amount: Option<i64>,
    pub take_amount: Option<i64>,
    pub available: Option<i64>,
    pub payload: Option<Payload>,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    More,
    Less,
    Equal,
    LessOrEqual,
    MoreOrEqual,
}

impl Comparator {
    pub fn evaluate(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Comparator::More => lhs > rhs,
            Comparator::Less => lhs < rhs,
            Comparator::Equal => lhs == rhs,
            Comparator::LessOrEqual => lhs <= rhs,
            Comparator::MoreOrEqual => lhs >= rhs,
        }
    }

    pub fn sql_operator(self) -> &'static str {
        match self {
            Comparator::More => ">",
            Comparator::Less => "<",
            Comparator::Equal => "=",
            Comparator::LessOrEqual => "<=",
            Comparator::MoreOrEqual => ">=",
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSort {
    TakeAmount,
    GiveAmount,
}

/// Query parameters for listing orders. Every field is optional; an unset field does not
/// constrain the result. The `take_payload` filter is matched against `order.take_payload`, not
/// `order.give_payload` — give-side and take-side filters never cross over.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub owner_id: Option<OwnerId>,
    pub give_name: Option<String>,
    pub give_payload: Option<Payload>,
    pub give_amount: Option<i64>,
    pub give_amount_comparator: Option<Comparator>,
    pub take_name: Option<String>,
    pub take_payload: Option<Payload>,
    pub take_amount: Option<i64>,
    pub take_amount_comparator: Option<Comparator>,
    pub sort_by: Option<OrderSort>,
    pub sort_descending: bool,
    pub offset: i64,
    pub limit: i64,
}
