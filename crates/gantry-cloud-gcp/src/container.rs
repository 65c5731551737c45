//! GKE clients: clusters and node pools
//!
//! Create and delete calls use `--async`, so they return once the operation
//! is accepted; readiness is observed through `describe`.

use crate::command::args;
use crate::compute::gcloud_auth;
use crate::gcloud::Gcloud;
use crate::kubectl::Kubectl;
use crate::status::{count_ready_nodes, gke_status, spec_mismatch};
use async_trait::async_trait;
use gantry_cloud::{AuthStatus, ExternalStatus, ResourceClient, Result};
use gantry_core::{ClusterSpec, Context, NodePoolSpec, ResourceDescriptor, ResourceSpec};

fn cluster_location<'a>(ctx: &'a Context, spec: &'a ClusterSpec) -> &'a str {
    spec.location.as_deref().unwrap_or(ctx.default_location())
}

fn pool_location<'a>(ctx: &'a Context, spec: &'a NodePoolSpec) -> &'a str {
    spec.location.as_deref().unwrap_or(ctx.default_location())
}

/// Arguments for `gcloud container clusters create`
pub fn cluster_create_args(ctx: &Context, spec: &ClusterSpec) -> Vec<String> {
    let mut command = args(["container", "clusters", "create", spec.name.as_str()]);
    command.push(format!("--location={}", cluster_location(ctx, spec)));
    if let Some(network) = &spec.network {
        command.push(format!("--network={}", network));
    }
    if let Some(subnetwork) = &spec.subnetwork {
        command.push(format!("--subnetwork={}", subnetwork));
    }
    if let Some(channel) = &spec.release_channel {
        command.push(format!("--release-channel={}", channel));
    }
    if spec.workload_identity {
        command.push(format!("--workload-pool={}.svc.id.goog", ctx.project));
    }
    if spec.pods_range.is_some() || spec.services_range.is_some() {
        command.push("--enable-ip-alias".to_string());
    }
    if let Some(range) = &spec.pods_range {
        command.push(format!("--cluster-secondary-range-name={}", range));
    }
    if let Some(range) = &spec.services_range {
        command.push(format!("--services-secondary-range-name={}", range));
    }
    // Node pools are declared separately; keep the default pool minimal
    command.push("--num-nodes=1".to_string());
    command.push("--async".to_string());
    command
}

/// Arguments for `gcloud container node-pools create`
pub fn node_pool_create_args(ctx: &Context, spec: &NodePoolSpec) -> Vec<String> {
    let mut command = args(["container", "node-pools", "create", spec.name.as_str()]);
    command.push(format!("--cluster={}", spec.cluster));
    command.push(format!("--location={}", pool_location(ctx, spec)));
    command.push(format!("--machine-type={}", spec.machine_type));
    command.push(format!("--num-nodes={}", spec.min_nodes));
    if spec.max_nodes > spec.min_nodes {
        command.push("--enable-autoscaling".to_string());
        command.push(format!("--min-nodes={}", spec.min_nodes));
        command.push(format!("--max-nodes={}", spec.max_nodes));
    }
    if let Some(size) = spec.disk_size_gb {
        command.push(format!("--disk-size={}", size));
    }
    if spec.spot {
        command.push("--spot".to_string());
    }
    if let Some(account) = &spec.service_account {
        command.push(format!("--service-account={}", account));
    }
    command.push("--async".to_string());
    command
}

/// GKE clusters
#[derive(Debug, Clone, Default)]
pub struct ClusterClient {
    gcloud: Gcloud,
}

impl ClusterClient {
    pub fn new(gcloud: Gcloud) -> Self {
        Self { gcloud }
    }
}

#[async_trait]
impl ResourceClient for ClusterClient {
    fn name(&self) -> &str {
        "gcloud-cluster"
    }

    async fn check_auth(&self, _ctx: &Context) -> Result<AuthStatus> {
        gcloud_auth(&self.gcloud).await
    }

    async fn create(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::Cluster(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        self.gcloud.run(ctx, cluster_create_args(ctx, spec)).await?;
        Ok(())
    }

    async fn update(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::Cluster(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let mut command = args(["container", "clusters", "update", spec.name.as_str()]);
        command.push(format!("--location={}", cluster_location(ctx, spec)));
        match &spec.release_channel {
            Some(channel) => command.push(format!("--release-channel={}", channel)),
            None => command.push("--release-channel=None".to_string()),
        }
        command.push("--async".to_string());
        self.gcloud.run(ctx, command).await?;
        Ok(())
    }

    async fn get_status(
        &self,
        ctx: &Context,
        descriptor: &ResourceDescriptor,
    ) -> Result<ExternalStatus> {
        let ResourceSpec::Cluster(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let mut command = args(["container", "clusters", "describe", spec.name.as_str()]);
        command.push(format!("--location={}", cluster_location(ctx, spec)));
        Ok(match self.gcloud.describe(ctx, command).await? {
            Some(raw) => gke_status(&raw),
            None => ExternalStatus::absent(),
        })
    }

    async fn delete(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::Cluster(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let mut command = args(["container", "clusters", "delete", spec.name.as_str()]);
        command.push(format!("--location={}", cluster_location(ctx, spec)));
        command.push("--async".to_string());
        self.gcloud.run(ctx, command).await?;
        Ok(())
    }
}

/// GKE node pools
///
/// Readiness needs the count of Ready nodes, which only the cluster API
/// reports, so this client also talks to kubectl.
#[derive(Debug, Clone, Default)]
pub struct NodePoolClient {
    gcloud: Gcloud,
    kubectl: Kubectl,
}

impl NodePoolClient {
    pub fn new(gcloud: Gcloud, kubectl: Kubectl) -> Self {
        Self { gcloud, kubectl }
    }
}

#[async_trait]
impl ResourceClient for NodePoolClient {
    fn name(&self) -> &str {
        "gcloud-node-pool"
    }

    async fn check_auth(&self, _ctx: &Context) -> Result<AuthStatus> {
        gcloud_auth(&self.gcloud).await
    }

    async fn create(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::NodePool(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        self.gcloud.run(ctx, node_pool_create_args(ctx, spec)).await?;
        Ok(())
    }

    async fn update(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::NodePool(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let mut command = args(["container", "node-pools", "update", spec.name.as_str()]);
        command.push(format!("--cluster={}", spec.cluster));
        command.push(format!("--location={}", pool_location(ctx, spec)));
        if spec.max_nodes > spec.min_nodes {
            command.push("--enable-autoscaling".to_string());
            command.push(format!("--min-nodes={}", spec.min_nodes));
            command.push(format!("--max-nodes={}", spec.max_nodes));
        } else {
            command.push("--no-enable-autoscaling".to_string());
        }
        self.gcloud.run(ctx, command).await?;
        Ok(())
    }

    async fn get_status(
        &self,
        ctx: &Context,
        descriptor: &ResourceDescriptor,
    ) -> Result<ExternalStatus> {
        let ResourceSpec::NodePool(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let mut command = args(["container", "node-pools", "describe", spec.name.as_str()]);
        command.push(format!("--cluster={}", spec.cluster));
        command.push(format!("--location={}", pool_location(ctx, spec)));
        let Some(raw) = self.gcloud.describe(ctx, command).await? else {
            return Ok(ExternalStatus::absent());
        };

        let mut status = gke_status(&raw);
        if status.phase.as_deref() == Some("RUNNING") {
            let selector = format!("cloud.google.com/gke-nodepool={}", spec.name);
            let nodes = self.kubectl.list(ctx, "nodes", &selector).await?;
            status = status.with_ready_count(count_ready_nodes(&nodes));
        }
        Ok(status)
    }

    async fn delete(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::NodePool(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let mut command = args(["container", "node-pools", "delete", spec.name.as_str()]);
        command.push(format!("--cluster={}", spec.cluster));
        command.push(format!("--location={}", pool_location(ctx, spec)));
        command.push("--async".to_string());
        self.gcloud.run(ctx, command).await?;
        Ok(())
    }
}
