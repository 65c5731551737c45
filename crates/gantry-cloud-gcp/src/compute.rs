//! Compute Engine clients: networks, subnets, static addresses

use crate::command::args;
use crate::gcloud::Gcloud;
use crate::status::{describe_status, spec_mismatch};
use async_trait::async_trait;
use gantry_cloud::{AuthStatus, ExternalStatus, ResourceClient, Result};
use gantry_core::{Context, ResourceDescriptor, ResourceSpec};
use serde_json::Value;

/// VPC networks
#[derive(Debug, Clone, Default)]
pub struct NetworkClient {
    gcloud: Gcloud,
}

impl NetworkClient {
    pub fn new(gcloud: Gcloud) -> Self {
        Self { gcloud }
    }
}

#[async_trait]
impl ResourceClient for NetworkClient {
    fn name(&self) -> &str {
        "gcloud-network"
    }

    async fn check_auth(&self, _ctx: &Context) -> Result<AuthStatus> {
        gcloud_auth(&self.gcloud).await
    }

    async fn create(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::Network(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let mut command = args(["compute", "networks", "create", spec.name.as_str()]);
        command.push(format!(
            "--subnet-mode={}",
            if spec.auto_subnets { "auto" } else { "custom" }
        ));
        if let Some(mode) = &spec.routing_mode {
            command.push(format!("--bgp-routing-mode={}", mode.to_lowercase()));
        }
        self.gcloud.run(ctx, command).await?;
        Ok(())
    }

    async fn update(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::Network(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let mode = spec.routing_mode.as_deref().unwrap_or("regional");
        let mut command = args(["compute", "networks", "update", spec.name.as_str()]);
        command.push(format!("--bgp-routing-mode={}", mode.to_lowercase()));
        self.gcloud.run(ctx, command).await?;
        Ok(())
    }

    async fn get_status(
        &self,
        ctx: &Context,
        descriptor: &ResourceDescriptor,
    ) -> Result<ExternalStatus> {
        let ResourceSpec::Network(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let found = self
            .gcloud
            .describe(ctx, args(["compute", "networks", "describe", spec.name.as_str()]))
            .await?;
        Ok(describe_status(found))
    }

    async fn delete(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::Network(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        self.gcloud
            .run(ctx, args(["compute", "networks", "delete", spec.name.as_str()]))
            .await?;
        Ok(())
    }
}

/// Subnetworks with optional secondary ranges
#[derive(Debug, Clone, Default)]
pub struct SubnetClient {
    gcloud: Gcloud,
}

impl SubnetClient {
    pub fn new(gcloud: Gcloud) -> Self {
        Self { gcloud }
    }
}

#[async_trait]
impl ResourceClient for SubnetClient {
    fn name(&self) -> &str {
        "gcloud-subnet"
    }

    async fn check_auth(&self, _ctx: &Context) -> Result<AuthStatus> {
        gcloud_auth(&self.gcloud).await
    }

    async fn create(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::Subnet(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let region = spec.region.as_deref().unwrap_or(&ctx.region);
        let mut command = args(["compute", "networks", "subnets", "create", spec.name.as_str()]);
        command.push(format!("--network={}", spec.network));
        command.push(format!("--region={}", region));
        command.push(format!("--range={}", spec.range));
        if !spec.secondary_ranges.is_empty() {
            let ranges: Vec<String> = spec
                .secondary_ranges
                .iter()
                .map(|(name, range)| format!("{}={}", name, range))
                .collect();
            command.push(format!("--secondary-range={}", ranges.join(",")));
        }
        self.gcloud.run(ctx, command).await?;
        Ok(())
    }

    async fn get_status(
        &self,
        ctx: &Context,
        descriptor: &ResourceDescriptor,
    ) -> Result<ExternalStatus> {
        let ResourceSpec::Subnet(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let region = spec.region.as_deref().unwrap_or(&ctx.region);
        let mut command = args(["compute", "networks", "subnets", "describe", spec.name.as_str()]);
        command.push(format!("--region={}", region));
        let found = self.gcloud.describe(ctx, command).await?;
        Ok(describe_status(found))
    }

    async fn delete(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::Subnet(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let region = spec.region.as_deref().unwrap_or(&ctx.region);
        let mut command = args(["compute", "networks", "subnets", "delete", spec.name.as_str()]);
        command.push(format!("--region={}", region));
        self.gcloud.run(ctx, command).await?;
        Ok(())
    }
}

/// Reserved external IP addresses
#[derive(Debug, Clone, Default)]
pub struct StaticAddressClient {
    gcloud: Gcloud,
}

impl StaticAddressClient {
    pub fn new(gcloud: Gcloud) -> Self {
        Self { gcloud }
    }

    fn scope(ctx: &Context, global: bool, region: Option<&str>) -> String {
        if global {
            "--global".to_string()
        } else {
            format!("--region={}", region.unwrap_or(&ctx.region))
        }
    }
}

/// Address status: RESERVING, RESERVED or IN_USE
pub fn address_status(raw: &Value) -> ExternalStatus {
    let mut status = ExternalStatus::present().with_raw(raw.clone());
    if let Some(phase) = raw["status"].as_str() {
        status = status.with_phase(phase);
    }
    if let Some(address) = raw["address"].as_str() {
        status = status.with_address(address);
    }
    status
}

#[async_trait]
impl ResourceClient for StaticAddressClient {
    fn name(&self) -> &str {
        "gcloud-address"
    }

    async fn check_auth(&self, _ctx: &Context) -> Result<AuthStatus> {
        gcloud_auth(&self.gcloud).await
    }

    async fn create(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::StaticAddress(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let mut command = args(["compute", "addresses", "create", spec.name.as_str()]);
        command.push(Self::scope(ctx, spec.global, spec.region.as_deref()));
        self.gcloud.run(ctx, command).await?;
        Ok(())
    }

    async fn get_status(
        &self,
        ctx: &Context,
        descriptor: &ResourceDescriptor,
    ) -> Result<ExternalStatus> {
        let ResourceSpec::StaticAddress(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let mut command = args(["compute", "addresses", "describe", spec.name.as_str()]);
        command.push(Self::scope(ctx, spec.global, spec.region.as_deref()));
        Ok(match self.gcloud.describe(ctx, command).await? {
            Some(raw) => address_status(&raw),
            None => ExternalStatus::absent(),
        })
    }

    async fn delete(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::StaticAddress(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let mut command = args(["compute", "addresses", "delete", spec.name.as_str()]);
        command.push(Self::scope(ctx, spec.global, spec.region.as_deref()));
        self.gcloud.run(ctx, command).await?;
        Ok(())
    }
}

pub(crate) async fn gcloud_auth(gcloud: &Gcloud) -> Result<AuthStatus> {
    Ok(match gcloud.check_auth().await {
        Ok(account) => AuthStatus::ok(account),
        Err(e) => AuthStatus::failed(e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_address_status() {
        let raw = json!({"name": "ingress-ip", "address": "34.1.2.3", "status": "RESERVED"});
        let status = address_status(&raw);
        assert!(status.exists);
        assert_eq!(status.phase.as_deref(), Some("RESERVED"));
        assert_eq!(status.address.as_deref(), Some("34.1.2.3"));
    }
}
