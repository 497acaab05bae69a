//! Resource identity and desired-state types

use std::fmt;

use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};

/// Namespaced, statically-typed Kubernetes objects the client can manage.
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> ManagedResource for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Identity of a stored object: kind, namespace and name
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    /// Identity of the object of kind `K` called `name` in `namespace`
    pub fn new<K: ManagedResource>(namespace: &str, name: &str) -> Self {
        Self {
            kind: K::kind(&()).into_owned(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Every object of kind `K` in `namespace`, as addressed by a list
    pub fn collection<K: ManagedResource>(namespace: &str) -> Self {
        Self::new::<K>(namespace, "")
    }

    /// Whether this addresses a whole namespace rather than one object
    pub fn is_collection(&self) -> bool {
        self.name.is_empty()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_collection() {
            write!(f, "{}/{}", self.kind, self.namespace)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// How dependents of a deleted object are treated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Propagation {
    /// Dependents are removed before the owner disappears
    Foreground,
    /// The owner is removed at once, dependents are collected afterwards
    Background,
    /// Dependents are detached from the owner and kept
    Orphan,
}

impl From<Propagation> for kube::api::PropagationPolicy {
    fn from(policy: Propagation) -> Self {
        match policy {
            Propagation::Foreground => kube::api::PropagationPolicy::Foreground,
            Propagation::Background => kube::api::PropagationPolicy::Background,
            Propagation::Orphan => kube::api::PropagationPolicy::Orphan,
        }
    }
}

/// Caller-provided target object for a named resource.
///
/// The name comes from the object's metadata and the kind from `K`. The value
/// is never modified once built; `submission` hands out a prepared copy.
#[derive(Clone, Debug)]
pub struct DesiredState<K> {
    namespace: String,
    object: K,
}

impl<K: ManagedResource> DesiredState<K> {
    pub fn new(namespace: impl Into<String>, object: K) -> Result<Self> {
        let has_name = object
            .meta()
            .name
            .as_deref()
            .is_some_and(|name| !name.is_empty());
        if !has_name {
            return Err(Error::validation(format!(
                "desired {} has no metadata.name",
                K::kind(&())
            )));
        }

        Ok(Self {
            namespace: namespace.into(),
            object,
        })
    }

    pub fn name(&self) -> &str {
        self.object.meta().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn object(&self) -> &K {
        &self.object
    }

    pub fn identity(&self) -> ObjectRef {
        ObjectRef::new::<K>(&self.namespace, self.name())
    }

    /// Copy suitable for a create request: namespace set, no store-assigned fields
    pub(crate) fn submission(&self) -> K {
        let mut object = self.object.clone();
        let meta = object.meta_mut();
        meta.namespace = Some(self.namespace.clone());
        meta.resource_version = None;
        meta.uid = None;
        meta.creation_timestamp = None;
        meta.generation = None;
        object
    }
}
