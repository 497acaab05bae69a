//! Pod listing demo
//!
//! Prints the pods in the default namespace of the selected kubeconfig
//! context. The namespace is not hardcoded; pick another one by switching
//! the context's `namespace` in the kubeconfig.
//!
//! Usage: cargo run --bin list-pods -- --kubeconfig ~/.kube/config

use clap::Parser;
use k8s_openapi::api::core::v1::Pod;

use workload_reconciler::cli::{self, Cli};
use workload_reconciler::ResourceClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    cli::init_tracing();

    let config = args.client_config().map_err(|e| {
        cli::report(&e);
        e
    })?;
    let client = config.connect().await.map_err(|e| {
        cli::report(&e);
        e
    })?;
    let namespace = client.default_namespace().to_string();

    let pods: ResourceClient<Pod> = ResourceClient::from_client(client, &config);
    let items = pods.list(&namespace).await.map_err(|e| {
        cli::report(&e);
        e
    })?;

    println!(
        "There are {} pods in the cluster--namespace({})",
        items.len(),
        namespace
    );
    for pod in &items {
        println!("pod.Name: {}", pod.metadata.name.as_deref().unwrap_or_default());
    }

    Ok(())
}
