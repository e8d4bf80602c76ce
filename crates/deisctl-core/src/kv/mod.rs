//! Key/value configuration store.
//!
//! The dispatcher only relies on per-key atomicity from the store; it never
//! groups writes into transactions.

mod etcd;
mod file;
mod path;

pub use etcd::EtcdctlStore;
pub use file::FileKvStore;
pub use path::{DEFAULT_NAMESPACE, Keyspace};

use crate::error::Result;

/// Minimal store contract used by the config protocol.
pub trait KvStore: Send + Sync {
    /// Value at `path`, or `None` when the key does not exist.
    fn get(&self, path: &str) -> Result<Option<String>>;

    fn set(&self, path: &str, value: &str) -> Result<()>;

    /// Delete `path`. Returns whether the key existed.
    fn remove(&self, path: &str) -> Result<bool>;

    /// Direct children of `dir` as `(key, value)` pairs, sorted by key.
    fn list(&self, dir: &str) -> Result<Vec<(String, String)>>;
}
