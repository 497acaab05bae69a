//! Deployment helpers used by the demo binary

use k8s_openapi::api::apps::v1::Deployment;

use crate::error::Result;

/// Name of the demo deployment
pub const DEMO_DEPLOYMENT_NAME: &str = "demo-deployment";

/// Namespace the demo runs in
pub const DEMO_NAMESPACE: &str = "default";

const DEMO_DEPLOYMENT_MANIFEST: &str = include_str!("../manifests/demo-deployment.yaml");

/// Two nginx replicas labelled `app=demo`
pub fn demo_deployment() -> Result<Deployment> {
    Ok(serde_yaml::from_str(DEMO_DEPLOYMENT_MANIFEST)?)
}

/// Desired replica count; the API server treats an unset value as 1
pub fn replicas(deployment: &Deployment) -> i32 {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1)
}

/// Mutation setting the desired replica count
pub fn set_replicas(replicas: i32) -> impl Fn(Deployment) -> Deployment + Send + Sync {
    move |mut deployment| {
        deployment.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
        deployment
    }
}
