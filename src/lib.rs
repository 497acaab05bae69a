//! Workload reconciler
//!
//! A conflict-safe client for Kubernetes workloads: create, get, list and
//! delete objects, and update them through an optimistic-concurrency retry
//! loop fenced by `metadata.resourceVersion`.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod resource;
pub mod retry;
pub mod store;
pub mod workloads;

pub use client::ResourceClient;
pub use config::ClientConfig;
pub use error::{Error, ErrorKind, Result};
pub use resource::{DesiredState, ManagedResource, ObjectRef, Propagation};
pub use retry::RetryPolicy;
