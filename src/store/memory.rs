//! In-process versioned object store
//!
//! Behaves like the API server for the calls `ObjectStore` makes: it assigns
//! uids and resource versions, fences replacements on the submitted version
//! and applies deletion propagation through `metadata.ownerReferences`.
//! Objects of every kind share one map, so dependents of another kind are
//! found when their owner is deleted.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use super::ObjectStore;
use crate::error::{Error, Result};
use crate::resource::{ManagedResource, ObjectRef, Propagation};

type Objects = BTreeMap<ObjectRef, Value>;

/// Shared in-memory store; clones see the same objects
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<Objects>>,
    version_counter: Arc<AtomicU64>,
    uid_counter: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored document, keyed by identity
    pub async fn snapshot(&self) -> BTreeMap<ObjectRef, Value> {
        self.objects.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn next_version(&self) -> String {
        (self.version_counter.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn next_uid(&self) -> String {
        let n = self.uid_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("00000000-0000-4000-8000-{:012x}", n)
    }
}

fn decode<K: ManagedResource>(value: &Value) -> Result<K> {
    Ok(serde_json::from_value(value.clone())?)
}

fn uid_of(value: &Value) -> Option<&str> {
    value.pointer("/metadata/uid").and_then(Value::as_str)
}

fn is_owned_by(value: &Value, owner_uid: &str) -> bool {
    value
        .pointer("/metadata/ownerReferences")
        .and_then(Value::as_array)
        .is_some_and(|refs| {
            refs.iter()
                .any(|r| r.get("uid").and_then(Value::as_str) == Some(owner_uid))
        })
}

fn dependents_of(objects: &Objects, namespace: &str, owner_uid: &str) -> Vec<ObjectRef> {
    objects
        .iter()
        .filter(|(key, value)| key.namespace == namespace && is_owned_by(value, owner_uid))
        .map(|(key, _)| key.clone())
        .collect()
}

/// Remove every object transitively owned by `owner_uid`
fn cascade(objects: &mut Objects, namespace: &str, owner_uid: &str) {
    for dependent in dependents_of(objects, namespace, owner_uid) {
        if let Some(value) = objects.remove(&dependent) {
            debug!(object = %dependent, "Collected dependent");
            if let Some(uid) = uid_of(&value) {
                cascade(objects, namespace, uid);
            }
        }
    }
}

/// Drop owner references to `owner_uid`, keeping the dependents
fn orphan(objects: &mut Objects, namespace: &str, owner_uid: &str) {
    for dependent in dependents_of(objects, namespace, owner_uid) {
        let Some(value) = objects.get_mut(&dependent) else {
            continue;
        };
        let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) else {
            continue;
        };
        let emptied = match metadata
            .get_mut("ownerReferences")
            .and_then(Value::as_array_mut)
        {
            Some(refs) => {
                refs.retain(|r| r.get("uid").and_then(Value::as_str) != Some(owner_uid));
                refs.is_empty()
            }
            None => false,
        };
        if emptied {
            metadata.remove("ownerReferences");
        }
        debug!(object = %dependent, "Orphaned dependent");
    }
}

fn conflict_message(key: &ObjectRef) -> String {
    format!(
        "Operation cannot be fulfilled on {} \"{}\": the object has been modified; \
         please apply your changes to the latest version and try again",
        key.kind.to_lowercase(),
        key.name
    )
}

#[async_trait]
impl<K: ManagedResource> ObjectStore<K> for MemoryStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<K> {
        let key = ObjectRef::new::<K>(namespace, name);
        let objects = self.objects.read().await;
        match objects.get(&key) {
            Some(value) => decode(value),
            None => Err(Error::NotFound(key)),
        }
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K> {
        let name = object
            .meta()
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::validation("object has no metadata.name"))?;
        let key = ObjectRef::new::<K>(namespace, &name);

        let mut objects = self.objects.write().await;
        if objects.contains_key(&key) {
            return Err(Error::AlreadyExists(key));
        }

        let mut stored = object.clone();
        {
            let meta = stored.meta_mut();
            meta.namespace = Some(namespace.to_string());
            meta.uid = Some(self.next_uid());
            meta.resource_version = Some(self.next_version());
            meta.generation = Some(1);
            meta.creation_timestamp = Some(Time(Utc::now()));
        }

        objects.insert(key, serde_json::to_value(&stored)?);
        Ok(stored)
    }

    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K> {
        let key = ObjectRef::new::<K>(namespace, name);

        let mut objects = self.objects.write().await;
        let current: K = match objects.get(&key) {
            Some(value) => decode(value)?,
            None => return Err(Error::NotFound(key)),
        };

        // An absent version is an unconditional update, as on the API server
        if let Some(submitted) = object.meta().resource_version.as_deref() {
            if current.meta().resource_version.as_deref() != Some(submitted) {
                return Err(Error::VersionConflict {
                    message: conflict_message(&key),
                    object: key,
                });
            }
        }

        let mut stored = object.clone();
        {
            let previous = current.meta();
            let meta = stored.meta_mut();
            meta.name = Some(name.to_string());
            meta.namespace = Some(namespace.to_string());
            meta.uid = previous.uid.clone();
            meta.creation_timestamp = previous.creation_timestamp.clone();
            meta.generation = Some(previous.generation.unwrap_or(0) + 1);
            meta.resource_version = Some(self.next_version());
        }

        objects.insert(key, serde_json::to_value(&stored)?);
        Ok(stored)
    }

    async fn list(&self, namespace: &str) -> Result<Vec<K>> {
        let kind = K::kind(&());
        let objects = self.objects.read().await;
        objects
            .iter()
            .filter(|(key, _)| key.kind == kind && key.namespace == namespace)
            .map(|(_, value)| decode(value))
            .collect()
    }

    async fn delete(&self, namespace: &str, name: &str, propagation: Propagation) -> Result<()> {
        let key = ObjectRef::new::<K>(namespace, name);

        let mut objects = self.objects.write().await;
        let Some(value) = objects.get(&key) else {
            return Err(Error::NotFound(key));
        };
        let uid = uid_of(value).map(str::to_string);

        match (propagation, uid) {
            (Propagation::Foreground, Some(uid)) => {
                cascade(&mut objects, namespace, &uid);
                objects.remove(&key);
            }
            (Propagation::Background, Some(uid)) => {
                objects.remove(&key);
                cascade(&mut objects, namespace, &uid);
            }
            (Propagation::Orphan, Some(uid)) => {
                objects.remove(&key);
                orphan(&mut objects, namespace, &uid);
            }
            (_, None) => {
                objects.remove(&key);
            }
        }

        debug!(object = %key, ?propagation, "Deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn config_map(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn versions_advance_on_every_write() {
        let store = MemoryStore::new();
        let created: ConfigMap = store.create("default", &config_map("a")).await.unwrap();
        let replaced = store.replace("default", "a", &created).await.unwrap();

        let first: u64 = created.metadata.resource_version.unwrap().parse().unwrap();
        let second: u64 = replaced.metadata.resource_version.unwrap().parse().unwrap();
        assert!(second > first);
        assert_eq!(replaced.metadata.uid, created.metadata.uid);
        assert_eq!(replaced.metadata.generation, Some(2));
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let store = MemoryStore::new();
        let created: ConfigMap = store.create("default", &config_map("a")).await.unwrap();
        store.replace("default", "a", &created).await.unwrap();

        let err = store.replace("default", "a", &created).await.unwrap_err();
        assert!(matches!(err, Error::VersionConflict { .. }));
        assert!(err.to_string().contains("the object has been modified"));
    }

    #[tokio::test]
    async fn missing_version_replaces_unconditionally() {
        let store = MemoryStore::new();
        let _: ConfigMap = store.create("default", &config_map("a")).await.unwrap();
        let replaced: ConfigMap = store.replace("default", "a", &config_map("a")).await.unwrap();
        assert!(replaced.metadata.resource_version.is_some());
    }

    #[tokio::test]
    async fn list_is_scoped_to_kind_and_namespace() {
        let store = MemoryStore::new();
        let _: ConfigMap = store.create("default", &config_map("b")).await.unwrap();
        let _: ConfigMap = store.create("default", &config_map("a")).await.unwrap();
        let _: ConfigMap = store.create("other", &config_map("c")).await.unwrap();

        let listed: Vec<ConfigMap> = store.list("default").await.unwrap();
        let names: Vec<_> = listed
            .iter()
            .map(|cm| cm.metadata.name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
