//! Workload reconciler demo
//!
//! Walks a deployment through its lifecycle against the cluster selected by
//! `--kubeconfig`: create, update with conflict retry, list, delete.

use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use k8s_openapi::api::apps::v1::Deployment;
use tracing::info;

use workload_reconciler::{
    cli::{self, Cli},
    workloads::{self, DEMO_DEPLOYMENT_NAME, DEMO_NAMESPACE},
    DesiredState, Propagation, ResourceClient, Result,
};

/// Upper bound for the whole update loop
const UPDATE_TIMEOUT: Duration = Duration::from_secs(60);

/// Replica count the update step converges to
const UPDATED_REPLICAS: i32 = 1;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    cli::init_tracing();
    cli::spawn_metrics_server();

    let config = args.client_config().map_err(|e| {
        cli::report(&e);
        e
    })?;
    match config.kubeconfig_path() {
        Some(path) => println!("kubeconfig: {}", path.display()),
        None => println!("kubeconfig: <default>"),
    }

    let client = config.connect().await.map_err(|e| {
        cli::report(&e);
        e
    })?;
    info!("Connected to Kubernetes API server");

    let deployments: ResourceClient<Deployment> = ResourceClient::from_client(client, &config);
    run(&deployments).await
}

async fn run(deployments: &ResourceClient<Deployment>) -> anyhow::Result<()> {
    let desired = DesiredState::new(DEMO_NAMESPACE, workloads::demo_deployment()?)?;

    println!("Creating deployment...");
    let created = step(deployments.create(&desired).await)?;
    println!(
        "Created deployment {}",
        created.metadata.name.as_deref().unwrap_or(DEMO_DEPLOYMENT_NAME)
    );

    println!("Updating deployment...");
    let update = deployments.update(
        DEMO_NAMESPACE,
        DEMO_DEPLOYMENT_NAME,
        workloads::set_replicas(UPDATED_REPLICAS),
    );
    let updated = tokio::time::timeout(UPDATE_TIMEOUT, update)
        .await
        .with_context(|| format!("update of {} timed out", desired.identity()))?;
    step(updated)?;
    println!("Updated deployment...");

    println!("List deployment in namespace {}", DEMO_NAMESPACE);
    for deployment in step(deployments.list(DEMO_NAMESPACE).await)? {
        println!(
            "*** {} ({} replicas)",
            deployment.metadata.name.as_deref().unwrap_or_default(),
            workloads::replicas(&deployment)
        );
    }

    println!("Deleting deployment...");
    step(
        deployments
            .delete(DEMO_NAMESPACE, DEMO_DEPLOYMENT_NAME, Propagation::Foreground)
            .await,
    )?;
    println!("Deleted deployment");

    Ok(())
}

/// Log a failed step before handing the error to `main`
fn step<T>(result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        cli::report(e);
    }
    result
}
