//! Client configuration
//!
//! Everything a `ResourceClient` needs is carried by an explicit
//! `ClientConfig`; nothing is read from process-wide state after
//! construction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Field manager recorded on objects written by this client
pub const DEFAULT_FIELD_MANAGER: &str = "workload-reconciler";

/// Overrides the number of update attempts
pub const MAX_ATTEMPTS_ENV: &str = "RECONCILER_MAX_ATTEMPTS";

/// Overrides the initial conflict backoff, in milliseconds
pub const BACKOFF_MS_ENV: &str = "RECONCILER_BACKOFF_MS";

/// Overrides the field manager name
pub const FIELD_MANAGER_ENV: &str = "RECONCILER_FIELD_MANAGER";

/// Configuration for building a reconciling client
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Kubeconfig file; `None` selects the per-user default location
    pub kubeconfig: Option<PathBuf>,
    /// Field manager sent with create and replace requests
    pub field_manager: String,
    /// Default policy for `update`
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults with overrides taken from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults with overrides taken from `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(MAX_ATTEMPTS_ENV) {
            config.retry.max_attempts = raw.trim().parse().map_err(|e| {
                Error::config(format!("Invalid {} '{}': {}", MAX_ATTEMPTS_ENV, raw, e))
            })?;
        }

        if let Some(raw) = lookup(BACKOFF_MS_ENV) {
            let millis: u64 = raw.trim().parse().map_err(|e| {
                Error::config(format!("Invalid {} '{}': {}", BACKOFF_MS_ENV, raw, e))
            })?;
            config.retry.initial_backoff = Duration::from_millis(millis);
            config.retry.max_backoff = config.retry.max_backoff.max(config.retry.initial_backoff);
        }

        if let Some(manager) = lookup(FIELD_MANAGER_ENV) {
            config.field_manager = manager;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_kubeconfig(mut self, path: Option<PathBuf>) -> Self {
        self.kubeconfig = path;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::config("max_attempts must be at least 1"));
        }

        if self.field_manager.trim().is_empty() {
            return Err(Error::config("field manager must not be empty"));
        }

        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(Error::config(format!(
                "jitter {} must be between 0 and 1",
                self.retry.jitter
            )));
        }

        if self.retry.factor < 1.0 {
            return Err(Error::config(format!(
                "backoff factor {} must be at least 1",
                self.retry.factor
            )));
        }

        Ok(())
    }

    /// Kubeconfig file that `load_kube_config` reads, if one can be named
    pub fn kubeconfig_path(&self) -> Option<PathBuf> {
        self.kubeconfig.clone().or_else(default_kubeconfig_path)
    }

    /// Resolve the cluster connection settings from the kubeconfig
    #[instrument(skip(self))]
    pub async fn load_kube_config(&self) -> Result<Config> {
        let kubeconfig = match self.kubeconfig_path() {
            Some(path) => read_kubeconfig(&path)?,
            None => Kubeconfig::read()?,
        };

        let config =
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        debug!(
            cluster = %config.cluster_url,
            namespace = %config.default_namespace,
            "Resolved cluster from kubeconfig"
        );
        Ok(config)
    }

    /// Build a Kubernetes client from the kubeconfig
    pub async fn connect(&self) -> Result<Client> {
        let config = self.load_kube_config().await?;
        Client::try_from(config)
            .map_err(|e| Error::config(format!("Failed to build Kubernetes client: {}", e)))
    }
}

fn read_kubeconfig(path: &Path) -> Result<Kubeconfig> {
    debug!(path = %path.display(), "Reading kubeconfig");
    Ok(Kubeconfig::read_from(path)?)
}

/// `~/.kube/config` for the current user, if a home directory is known
pub fn default_kubeconfig_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .or_else(|| std::env::var_os("USERPROFILE").filter(|h| !h.is_empty()))?;
    Some(PathBuf::from(home).join(".kube").join("config"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.field_manager, DEFAULT_FIELD_MANAGER);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.kubeconfig.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let config = ClientConfig::from_lookup(lookup(&[
            (MAX_ATTEMPTS_ENV, "12"),
            (BACKOFF_MS_ENV, "2500"),
            (FIELD_MANAGER_ENV, "ops-team"),
        ]))
        .unwrap();
        assert_eq!(config.retry.max_attempts, 12);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(2500));
        assert_eq!(config.retry.max_backoff, Duration::from_millis(2500));
        assert_eq!(config.field_manager, "ops-team");
    }

    #[test]
    fn invalid_overrides_are_config_errors() {
        let err = ClientConfig::from_lookup(lookup(&[(MAX_ATTEMPTS_ENV, "many")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = ClientConfig::from_lookup(lookup(&[(MAX_ATTEMPTS_ENV, "0")])).unwrap_err();
        assert!(err.to_string().contains("max_attempts"));

        let err = ClientConfig::from_lookup(lookup(&[(FIELD_MANAGER_ENV, " ")])).unwrap_err();
        assert!(err.to_string().contains("field manager"));
    }

    #[test]
    fn explicit_kubeconfig_wins() {
        let config = ClientConfig::default().with_kubeconfig(Some(PathBuf::from("/tmp/kc")));
        assert_eq!(config.kubeconfig_path(), Some(PathBuf::from("/tmp/kc")));
    }
}
