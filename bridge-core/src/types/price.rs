use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Address, U256};

/// Latest asset and share price reported for a vault.
///
/// Logically keyed by `(chain_id, vault)`; `id` is only an identity for
/// backends that want one.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PriceRecord {
    /// Opaque identity, kept stable across upserts
    pub id: Uuid,
    /// Destination chain the price is reported for
    pub chain_id: u64,
    /// Underlying asset
    pub asset: Address,
    /// Vault share token
    pub vault: Address,
    /// Price of the asset
    pub asset_price: U256,
    /// Price of one vault share
    pub share_price: U256,
    /// Time the vault was first priced
    pub created_at: DateTime<Utc>,
    /// Time of the latest update
    pub updated_at: DateTime<Utc>,
}

impl PriceRecord {
    /// New record stamped with the current time
    pub fn new(
        chain_id: u64,
        asset: Address,
        vault: Address,
        asset_price: U256,
        share_price: U256,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            chain_id,
            asset,
            vault,
            asset_price,
            share_price,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a newer price on top of an existing record, keeping its
    /// identity and creation time.
    pub fn merge_into(self, existing: &PriceRecord) -> PriceRecord {
        PriceRecord {
            id: existing.id,
            created_at: existing.created_at,
            ..self
        }
    }
}
