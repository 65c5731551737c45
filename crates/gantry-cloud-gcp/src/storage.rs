//! Cloud Storage bucket client

use crate::command::args;
use crate::compute::gcloud_auth;
use crate::gcloud::Gcloud;
use crate::status::{describe_status, spec_mismatch};
use async_trait::async_trait;
use gantry_cloud::{AuthStatus, ExternalStatus, ResourceClient, Result};
use gantry_core::{BucketSpec, Context, ResourceDescriptor, ResourceSpec};

fn bucket_command(verb: &str, spec: &BucketSpec) -> Vec<String> {
    args([
        "storage".to_string(),
        "buckets".to_string(),
        verb.to_string(),
        format!("gs://{}", spec.name),
    ])
}

/// Arguments for `gcloud storage buckets create`
pub fn bucket_create_args(ctx: &Context, spec: &BucketSpec) -> Vec<String> {
    let mut command = bucket_command("create", spec);
    command.push(format!(
        "--location={}",
        spec.location.as_deref().unwrap_or(&ctx.region)
    ));
    if let Some(class) = &spec.storage_class {
        command.push(format!("--default-storage-class={}", class));
    }
    if spec.uniform_access {
        command.push("--uniform-bucket-level-access".to_string());
    }
    command
}

/// Cloud Storage buckets
#[derive(Debug, Clone, Default)]
pub struct BucketClient {
    gcloud: Gcloud,
}

impl BucketClient {
    pub fn new(gcloud: Gcloud) -> Self {
        Self { gcloud }
    }
}

#[async_trait]
impl ResourceClient for BucketClient {
    fn name(&self) -> &str {
        "gcloud-bucket"
    }

    async fn check_auth(&self, _ctx: &Context) -> Result<AuthStatus> {
        gcloud_auth(&self.gcloud).await
    }

    async fn create(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::Bucket(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        self.gcloud.run(ctx, bucket_create_args(ctx, spec)).await?;
        Ok(())
    }

    async fn update(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::Bucket(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        // Location cannot change after creation
        let mut command = bucket_command("update", spec);
        if let Some(class) = &spec.storage_class {
            command.push(format!("--default-storage-class={}", class));
        }
        command.push(if spec.uniform_access {
            "--uniform-bucket-level-access".to_string()
        } else {
            "--no-uniform-bucket-level-access".to_string()
        });
        self.gcloud.run(ctx, command).await?;
        Ok(())
    }

    async fn get_status(
        &self,
        ctx: &Context,
        descriptor: &ResourceDescriptor,
    ) -> Result<ExternalStatus> {
        let ResourceSpec::Bucket(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let found = self
            .gcloud
            .describe(ctx, bucket_command("describe", spec))
            .await?;
        Ok(describe_status(found))
    }

    async fn delete(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::Bucket(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        self.gcloud
            .run(ctx, bucket_command("delete", spec))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_create_args() {
        let ctx = Context::new("acme-prod", "asia-northeast1");
        let spec = BucketSpec {
            name: "acme-assets".to_string(),
            location: None,
            storage_class: Some("STANDARD".to_string()),
            uniform_access: true,
        };

        let command = bucket_create_args(&ctx, &spec);
        assert_eq!(command[3], "gs://acme-assets");
        assert!(command.contains(&"--location=asia-northeast1".to_string()));
        assert!(command.contains(&"--default-storage-class=STANDARD".to_string()));
        assert!(command.contains(&"--uniform-bucket-level-access".to_string()));
    }
}
