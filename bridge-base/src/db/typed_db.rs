use derive_new::new;
use serde::{de::DeserializeOwned, Serialize};

use crate::db::{DbResult, DB};

/// JSON values of one entity, usually an agent.
///
/// Keys are laid out as `<entity>_<table><key>`, so entities sharing a
/// database never see each other's rows.
#[derive(Debug, Clone, new)]
pub struct TypedDB {
    entity: String,
    db: DB,
}

impl TypedDB {
    fn key(&self, table: &str, key: &[u8]) -> Vec<u8> {
        let parts: [&[u8]; 4] = [self.entity.as_bytes(), b"_", table.as_bytes(), key];
        parts.concat()
    }

    /// Serialize `value` into `table`
    pub fn store_value<V: Serialize>(
        &self,
        table: &str,
        key: impl AsRef<[u8]>,
        value: &V,
    ) -> DbResult<()> {
        let raw = serde_json::to_vec(value)?;
        self.db.put(&self.key(table, key.as_ref()), &raw)
    }

    /// Deserialize the value under `key` in `table`
    pub fn retrieve_value<V: DeserializeOwned>(
        &self,
        table: &str,
        key: impl AsRef<[u8]>,
    ) -> DbResult<Option<V>> {
        match self.db.get(&self.key(table, key.as_ref()))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Remove the value under `key` in `table`
    pub fn delete_value(&self, table: &str, key: impl AsRef<[u8]>) -> DbResult<()> {
        self.db.delete(&self.key(table, key.as_ref()))
    }

    /// Deserialize every value of `table` whose key starts with `key_prefix`
    pub fn retrieve_values<V: DeserializeOwned>(
        &self,
        table: &str,
        key_prefix: impl AsRef<[u8]>,
    ) -> DbResult<Vec<V>> {
        self.db
            .scan_prefix(&self.key(table, key_prefix.as_ref()))?
            .iter()
            .map(|raw| Ok(serde_json::from_slice(raw)?))
            .collect()
    }
}
