//! Versioned object stores
//!
//! The reconciling client talks to its store only through `ObjectStore`,
//! which mirrors the five calls of the API server:
//! - `get`     GET    /{namespace}/{kind}/{name}
//! - `create`  POST   /{namespace}/{kind}
//! - `replace` PUT    /{namespace}/{kind}/{name}
//! - `list`    LIST   /{namespace}/{kind}
//! - `delete`  DELETE /{namespace}/{kind}/{name}?propagation=...

mod cluster;
mod memory;

pub use self::cluster::KubeStore;
pub use self::memory::MemoryStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::resource::{ManagedResource, Propagation};

/// A remote store of namespaced objects with optimistic concurrency.
///
/// Every successful write assigns a new `metadata.resourceVersion`. A
/// `replace` whose object carries a version other than the stored one must
/// fail with `Error::VersionConflict`.
#[async_trait]
pub trait ObjectStore<K: ManagedResource>: Send + Sync {
    /// Fetch the current object
    async fn get(&self, namespace: &str, name: &str) -> Result<K>;

    /// Store a new object; its name is taken from `object`
    async fn create(&self, namespace: &str, object: &K) -> Result<K>;

    /// Overwrite an existing object, fenced by its resourceVersion
    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K>;

    /// Snapshot of every object of this kind in `namespace`
    async fn list(&self, namespace: &str) -> Result<Vec<K>>;

    /// Remove an object, treating dependents according to `propagation`
    async fn delete(&self, namespace: &str, name: &str, propagation: Propagation) -> Result<()>;
}
