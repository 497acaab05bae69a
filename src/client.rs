//! Reconciling resource client
//!
//! Wraps an `ObjectStore` with the operations callers use to converge a
//! declared object: create, get, list, delete, and the optimistic-concurrency
//! update loop.
//!
//! The update loop moves through
//! `Reading -> Mutating -> Submitting -> {Success | Conflict -> Reading | Failure}`
//! and gives up with `Error::RetryExhausted` once the policy's attempts are
//! spent. Conflicts never reach the caller as such.

use std::marker::PhantomData;

use kube::Client;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::resource::{DesiredState, ManagedResource, ObjectRef, Propagation};
use crate::retry::RetryPolicy;
use crate::store::{KubeStore, ObjectStore};

/// Phase of one update attempt, reported in debug events
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdatePhase {
    Reading,
    Mutating,
    Submitting,
}

/// Client for objects of kind `K` held in store `S`.
///
/// Holds no state between calls besides its store handle and default retry
/// policy, so clones can be used from independent tasks.
pub struct ResourceClient<K, S = KubeStore<K>> {
    store: S,
    retry: RetryPolicy,
    _kind: PhantomData<fn() -> K>,
}

impl<K, S: Clone> Clone for ResourceClient<K, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            retry: self.retry.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: ManagedResource> ResourceClient<K, KubeStore<K>> {
    /// Client talking to the cluster behind `client`
    pub fn from_client(client: Client, config: &ClientConfig) -> Self {
        Self::new(
            KubeStore::with_field_manager(client, config.field_manager.clone()),
            config.retry.clone(),
        )
    }
}

fn outcome<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) => e.kind().as_str(),
    }
}

impl<K, S> ResourceClient<K, S>
where
    K: ManagedResource,
    S: ObjectStore<K>,
{
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            _kind: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn record<T>(&self, verb: &str, result: &Result<T>) {
        let kind = K::kind(&());
        metrics::OPERATIONS
            .with_label_values(&[verb, &*kind, outcome(result)])
            .inc();
    }

    /// Store a new object. An existing object with the same identity is left
    /// untouched and reported as `AlreadyExists`.
    pub async fn create(&self, desired: &DesiredState<K>) -> Result<K> {
        let kind = K::kind(&());
        let _timer = metrics::OPERATION_DURATION
            .with_label_values(&["create", &*kind])
            .start_timer();

        let object = desired.identity();
        let result = self
            .store
            .create(desired.namespace(), &desired.submission())
            .await;
        self.record("create", &result);

        if result.is_ok() {
            info!(%object, "Created");
        }
        result
    }

    pub async fn get(&self, namespace: &str, name: &str) -> Result<K> {
        let kind = K::kind(&());
        let _timer = metrics::OPERATION_DURATION
            .with_label_values(&["get", &*kind])
            .start_timer();

        let result = self.store.get(namespace, name).await;
        self.record("get", &result);
        result
    }

    /// Snapshot of every object of kind `K` in `namespace`; empty when there
    /// are none.
    pub async fn list(&self, namespace: &str) -> Result<Vec<K>> {
        let kind = K::kind(&());
        let _timer = metrics::OPERATION_DURATION
            .with_label_values(&["list", &*kind])
            .start_timer();

        let result = self.store.list(namespace).await;
        self.record("list", &result);
        result
    }

    /// Remove an object. A missing object is reported as `NotFound`.
    pub async fn delete(&self, namespace: &str, name: &str, propagation: Propagation) -> Result<()> {
        let kind = K::kind(&());
        let _timer = metrics::OPERATION_DURATION
            .with_label_values(&["delete", &*kind])
            .start_timer();

        let result = self.store.delete(namespace, name, propagation).await;
        self.record("delete", &result);

        if result.is_ok() {
            info!(object = %ObjectRef::new::<K>(namespace, name), ?propagation, "Deleted");
        }
        result
    }

    /// `update_with_retry` using the client's default policy
    pub async fn update<F>(&self, namespace: &str, name: &str, mutate: F) -> Result<K>
    where
        F: Fn(K) -> K + Send + Sync,
    {
        let policy = self.retry.clone();
        self.update_with_retry(namespace, name, &policy, mutate).await
    }

    /// Apply `mutate` to the latest stored object and write it back.
    ///
    /// Each attempt reads a fresh copy, so `mutate` may run several times and
    /// must not have side effects. The written object always carries the
    /// resourceVersion read in the same attempt, whatever `mutate` returned.
    /// Only version conflicts are retried.
    pub async fn update_with_retry<F>(
        &self,
        namespace: &str,
        name: &str,
        policy: &RetryPolicy,
        mutate: F,
    ) -> Result<K>
    where
        F: Fn(K) -> K + Send + Sync,
    {
        let kind = K::kind(&()).into_owned();
        let _timer = metrics::OPERATION_DURATION
            .with_label_values(&["update", kind.as_str()])
            .start_timer();

        let result = self.update_loop(namespace, name, policy, &mutate).await;
        self.record("update", &result);
        result
    }

    async fn update_loop<F>(
        &self,
        namespace: &str,
        name: &str,
        policy: &RetryPolicy,
        mutate: &F,
    ) -> Result<K>
    where
        F: Fn(K) -> K + Send + Sync,
    {
        let object = ObjectRef::new::<K>(namespace, name);
        let max_attempts = policy.attempts();
        let mut last_conflict = String::new();

        for attempt in 1..=max_attempts {
            debug!(%object, attempt, phase = ?UpdatePhase::Reading);
            let current = self.store.get(namespace, name).await?;
            let read_version = current
                .meta()
                .resource_version
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    Error::validation(format!("{} was read without a resourceVersion", object))
                })?;

            debug!(%object, attempt, phase = ?UpdatePhase::Mutating, resource_version = %read_version);
            let mut next = mutate(current);
            if next.meta().name.as_deref() != Some(name) {
                return Err(Error::validation(format!(
                    "mutation of {} changed its name to {:?}",
                    object,
                    next.meta().name
                )));
            }
            next.meta_mut().resource_version = Some(read_version);

            debug!(%object, attempt, phase = ?UpdatePhase::Submitting);
            match self.store.replace(namespace, name, &next).await {
                Ok(updated) => {
                    metrics::UPDATE_ATTEMPTS
                        .with_label_values(&[object.kind.as_str()])
                        .observe(f64::from(attempt));
                    info!(
                        %object,
                        attempt,
                        resource_version = updated.meta().resource_version.as_deref().unwrap_or(""),
                        "Updated"
                    );
                    return Ok(updated);
                }
                Err(Error::VersionConflict { message, .. }) => {
                    metrics::UPDATE_CONFLICTS
                        .with_label_values(&[object.kind.as_str()])
                        .inc();
                    warn!(%object, attempt, max_attempts, "Version conflict, retrying from a fresh read");
                    last_conflict = message;

                    if attempt < max_attempts {
                        let delay = policy.delay(attempt, &mut rand::thread_rng());
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }

        metrics::RETRIES_EXHAUSTED
            .with_label_values(&[object.kind.as_str()])
            .inc();
        warn!(%object, attempts = max_attempts, "Update abandoned after repeated conflicts");
        Err(Error::RetryExhausted {
            object,
            attempts: max_attempts,
            last: last_conflict,
        })
    }
}
