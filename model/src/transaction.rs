//! The append-only journal. Every executed trade, whether produced by the matcher or by directed
//! fulfillment, is recorded as a `Transaction` with its two sides canonically ordered so that a
//! symmetric query need only sort the two item hashes once.

use crate::ids::{MarketId, OwnerId, TenantId, TransactionId};
use crate::payload::{ItemHash, Payload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSide {
    pub name: String,
    pub payload: Payload,
    pub hash: ItemHash,
    pub amount_per_unit: i64,
    pub owner_id: OwnerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub tenant_id: TenantId,
    pub market_id: MarketId,
    pub date: DateTime<Utc>,
    pub amount: i64,
    /// The side whose item hash is lexicographically greater.
    pub a: TransactionSide,
    /// The side whose item hash is lexicographically lesser (or equal).
    pub b: TransactionSide,
}

impl Transaction {
    /// Orders two candidate sides into canonical `(a, b)` slots by descending item hash, per the
    /// journal's symmetry invariant.
    pub fn canonicalize(first: TransactionSide, second: TransactionSide) -> (TransactionSide, TransactionSide) {
        if first.hash >= second.hash {
            (first, second)
        } else {
            (second, first)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAggregate {
    pub date: DateTime<Utc>,
    pub average_give_amount: f64,
    pub average_take_amount: f64,
    pub total_amount: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregateQuery {
    pub give_name: String,
    #[serde(default = "crate::payload::empty_payload")]
    pub give_payload: Payload,
    pub take_name: String,
    #[serde(default = "crate::payload::empty_payload")]
    pub take_payload: Payload,
    pub limit: i64,
}
