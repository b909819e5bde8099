//! A market is a named, tenant-scoped container for items, orders, and their transaction
//! history. Deleting one cascades to everything it contains (section 4.7) with no refund.

use crate::ids::{MarketId, TenantId};
use crate::payload::{empty_payload, Payload};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Market {
    pub market_id: MarketId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Arbitrary nested structure opaque to the core; surfaced as-is to callers.
    pub settings: Payload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMarket {
    pub name: String,
    #[serde(default = "empty_payload")]
    pub settings: Payload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketUpdate {
    pub name: Option<String>,
    pub settings: Option<Payload>,
}
