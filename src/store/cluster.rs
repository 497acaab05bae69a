//! Store backed by a Kubernetes API server

use std::marker::PhantomData;

use async_trait::async_trait;
use kube::{
    api::{DeleteParams, ListParams, PostParams},
    Api, Client,
};
use tracing::{debug, instrument};

use super::ObjectStore;
use crate::config::DEFAULT_FIELD_MANAGER;
use crate::error::{Error, Result};
use crate::resource::{ManagedResource, ObjectRef, Propagation};

/// Objects of kind `K` on a live cluster
pub struct KubeStore<K> {
    client: Client,
    field_manager: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for KubeStore<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            field_manager: self.field_manager.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: ManagedResource> KubeStore<K> {
    pub fn new(client: Client) -> Self {
        Self::with_field_manager(client, DEFAULT_FIELD_MANAGER)
    }

    pub fn with_field_manager(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
            _kind: PhantomData,
        }
    }

    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl<K: ManagedResource> ObjectStore<K> for KubeStore<K> {
    #[instrument(skip(self))]
    async fn get(&self, namespace: &str, name: &str) -> Result<K> {
        self.api(namespace)
            .get(name)
            .await
            .map_err(|e| Error::from_kube(e, ObjectRef::new::<K>(namespace, name)))
    }

    #[instrument(skip(self, object))]
    async fn create(&self, namespace: &str, object: &K) -> Result<K> {
        let name = object.meta().name.clone().unwrap_or_default();
        self.api(namespace)
            .create(&self.post_params(), object)
            .await
            .map_err(|e| Error::from_kube(e, ObjectRef::new::<K>(namespace, &name)))
    }

    #[instrument(skip(self, object))]
    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K> {
        debug!(
            resource_version = object.meta().resource_version.as_deref().unwrap_or(""),
            "Submitting replacement"
        );
        self.api(namespace)
            .replace(name, &self.post_params(), object)
            .await
            .map_err(|e| Error::from_kube(e, ObjectRef::new::<K>(namespace, name)))
    }

    #[instrument(skip(self))]
    async fn list(&self, namespace: &str) -> Result<Vec<K>> {
        let list = self
            .api(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::from_kube(e, ObjectRef::collection::<K>(namespace)))?;
        Ok(list.items)
    }

    #[instrument(skip(self))]
    async fn delete(&self, namespace: &str, name: &str, propagation: Propagation) -> Result<()> {
        let params = DeleteParams {
            propagation_policy: Some(propagation.into()),
            ..Default::default()
        };
        self.api(namespace)
            .delete(name, &params)
            .await
            .map_err(|e| Error::from_kube(e, ObjectRef::new::<K>(namespace, name)))?;
        Ok(())
    }
}
