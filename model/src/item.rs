//! Item balances. An item is identified within a market by the pair `(name, payload)`; two
//! balances with the same name but different payloads are not fungible with each other.

use crate::ids::{MarketId, OwnerId, TenantId};
use crate::payload::{ItemHash, Payload};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ItemBalance {
    pub tenant_id: TenantId,
    pub market_id: MarketId,
    pub owner_id: OwnerId,
    pub name: String,
    pub payload: Payload,
    #[sqlx(skip)]
    #[serde(skip)]
    pub hash: Option<ItemHash>,
    pub amount: i64,
}

impl ItemBalance {
    pub fn item_hash(&self) -> ItemHash {
        self.hash.unwrap_or_else(|| ItemHash::compute(&self.name, &self.payload))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemDelta {
    pub name: String,
    #[serde(default = "crate::payload::empty_payload")]
    pub payload: Payload,
    pub amount: i64,
}
