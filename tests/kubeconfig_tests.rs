//! Integration tests for kubeconfig resolution
//!
//! Loading only parses the file and resolves the current context, so these
//! tests run without a cluster.

use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use workload_reconciler::{ClientConfig, ErrorKind};

const TOKEN_KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: dev
clusters:
  - name: local
    cluster:
      server: https://127.0.0.1:6443
      insecure-skip-tls-verify: true
users:
  - name: developer
    user:
      token: not-a-real-token
contexts:
  - name: dev
    context:
      cluster: local
      user: developer
      namespace: team-a
"#;

fn kubeconfig_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn explicit_kubeconfig_selects_current_context() {
    let file = kubeconfig_file(TOKEN_KUBECONFIG);
    let config = ClientConfig::default().with_kubeconfig(Some(file.path().to_path_buf()));

    let resolved = config.load_kube_config().await.unwrap();

    assert_eq!(resolved.cluster_url.host(), Some("127.0.0.1"));
    assert_eq!(resolved.cluster_url.port_u16(), Some(6443));
    assert_eq!(resolved.default_namespace, "team-a");
}

#[test]
fn explicit_path_is_reported_as_is() {
    let path = PathBuf::from("/etc/reconciler/kubeconfig");
    let config = ClientConfig::default().with_kubeconfig(Some(path.clone()));
    assert_eq!(config.kubeconfig_path(), Some(path));
}

#[tokio::test]
async fn unparsable_kubeconfig_is_a_config_error() {
    let file = kubeconfig_file("clusters: [this is: not {valid");
    let config = ClientConfig::default().with_kubeconfig(Some(file.path().to_path_buf()));

    let err = config.load_kube_config().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.object().is_none());
}

#[tokio::test]
async fn missing_kubeconfig_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::default().with_kubeconfig(Some(dir.path().join("absent")));

    let err = config.load_kube_config().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[tokio::test]
async fn unknown_context_is_a_config_error() {
    let file = kubeconfig_file(&TOKEN_KUBECONFIG.replace("current-context: dev", "current-context: prod"));
    let config = ClientConfig::default().with_kubeconfig(Some(file.path().to_path_buf()));

    let err = config.load_kube_config().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}
