use std::path::{Path, PathBuf};
use std::sync::Arc;

use rocksdb::{Options, DB as Rocks};
use tracing::info;

use bridge_core::StoreError;

pub use rocks_store::*;
pub use typed_db::*;

/// Tx, cursor and price stores on top of rocksdb
mod rocks_store;
/// JSON values under entity scoped keys
mod typed_db;

/// Shared handle to a rocksdb instance
#[derive(Debug, Clone)]
pub struct DB(Arc<Rocks>);

impl From<Rocks> for DB {
    fn from(rocks: Rocks) -> Self {
        Self(Arc::new(rocks))
    }
}

/// Errors of the rocksdb backend
#[derive(thiserror::Error, Debug)]
pub enum DbError {
    /// Read or write failed
    #[error(transparent)]
    Rocks(#[from] rocksdb::Error),
    /// The database directory could not be opened or created
    #[error("failed to open database at {path}: {source}")]
    Open {
        /// Directory passed in the settings
        path: PathBuf,
        /// Underlying rocksdb error
        #[source]
        source: rocksdb::Error,
    },
    /// A value could not be (de)serialized
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Serialization(err) => StoreError::Serialization(err),
            err => StoreError::from_other(err),
        }
    }
}

/// Result of a rocksdb operation
pub type DbResult<T> = Result<T, DbError>;

impl DB {
    /// Open the database in directory `path`, creating it when missing
    #[tracing::instrument(err)]
    pub fn from_path(path: &Path) -> DbResult<DB> {
        let exists = path.is_dir();
        info!(path = %path.display(), exists, "opening database");

        let mut opts = Options::default();
        opts.create_if_missing(true);
        Rocks::open(&opts, path)
            .map(DB::from)
            .map_err(|source| DbError::Open {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Write `value` under `key`
    pub fn put(&self, key: &[u8], value: &[u8]) -> DbResult<()> {
        Ok(self.0.put(key, value)?)
    }

    /// Value under `key`
    pub fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        Ok(self.0.get(key)?)
    }

    /// Remove `key`, a missing key is not an error
    pub fn delete(&self, key: &[u8]) -> DbResult<()> {
        Ok(self.0.delete(key)?)
    }

    /// Values of every key starting with `prefix`, in key order
    pub fn scan_prefix(&self, prefix: &[u8]) -> DbResult<Vec<Vec<u8>>> {
        let mut values = vec![];
        for item in self.0.prefix_iterator(prefix) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(value.into_vec());
        }
        Ok(values)
    }
}
