//! IAM clients: service accounts and role bindings

use crate::command::args;
use crate::compute::gcloud_auth;
use crate::gcloud::Gcloud;
use crate::status::{describe_status, spec_mismatch};
use async_trait::async_trait;
use gantry_cloud::{AuthStatus, ExternalStatus, ResourceClient, Result};
use gantry_core::{Context, IamBindingSpec, ResourceDescriptor, ResourceSpec};
use serde_json::Value;

/// GCP service accounts
#[derive(Debug, Clone, Default)]
pub struct ServiceAccountClient {
    gcloud: Gcloud,
}

impl ServiceAccountClient {
    pub fn new(gcloud: Gcloud) -> Self {
        Self { gcloud }
    }
}

#[async_trait]
impl ResourceClient for ServiceAccountClient {
    fn name(&self) -> &str {
        "gcloud-service-account"
    }

    async fn check_auth(&self, _ctx: &Context) -> Result<AuthStatus> {
        gcloud_auth(&self.gcloud).await
    }

    async fn create(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::ServiceAccount(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let mut command = args(["iam", "service-accounts", "create", spec.account_id.as_str()]);
        if let Some(display_name) = &spec.display_name {
            command.push(format!("--display-name={}", display_name));
        }
        self.gcloud.run(ctx, command).await?;
        Ok(())
    }

    async fn update(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::ServiceAccount(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let email = spec.email(&ctx.project);
        let mut command = args(["iam", "service-accounts", "update", email.as_str()]);
        command.push(format!(
            "--display-name={}",
            spec.display_name.as_deref().unwrap_or("")
        ));
        self.gcloud.run(ctx, command).await?;
        Ok(())
    }

    async fn get_status(
        &self,
        ctx: &Context,
        descriptor: &ResourceDescriptor,
    ) -> Result<ExternalStatus> {
        let ResourceSpec::ServiceAccount(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let email = spec.email(&ctx.project);
        let found = self
            .gcloud
            .describe(ctx, args(["iam", "service-accounts", "describe", email.as_str()]))
            .await?;
        Ok(describe_status(found))
    }

    async fn delete(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::ServiceAccount(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let email = spec.email(&ctx.project);
        self.gcloud
            .run(ctx, args(["iam", "service-accounts", "delete", email.as_str()]))
            .await?;
        Ok(())
    }
}

/// Expand a bare account id to its email within the project
pub fn service_account_email(account: &str, project: &str) -> String {
    if account.contains('@') {
        account.to_string()
    } else {
        format!("{}@{}.iam.gserviceaccount.com", account, project)
    }
}

/// The `gcloud` command group and target a binding lives on
fn policy_target(ctx: &Context, spec: &IamBindingSpec) -> Vec<String> {
    match &spec.service_account {
        Some(account) => args([
            "iam".to_string(),
            "service-accounts".to_string(),
            service_account_email(account, &ctx.project),
        ]),
        None => args(["projects".to_string(), ctx.project.clone()]),
    }
}

fn binding_command(ctx: &Context, spec: &IamBindingSpec, verb: &str) -> Vec<String> {
    let mut target = policy_target(ctx, spec);
    let resource = target.pop().unwrap_or_default();
    target.push(verb.to_string());
    target.push(resource);
    target.push(format!("--member={}", spec.member));
    target.push(format!("--role={}", spec.role));
    target
}

/// Whether the policy grants `role` to `member`
pub fn binding_present(policy: &Value, role: &str, member: &str) -> bool {
    policy["bindings"].as_array().is_some_and(|bindings| {
        bindings.iter().any(|b| {
            b["role"].as_str() == Some(role)
                && b["members"]
                    .as_array()
                    .is_some_and(|members| members.iter().any(|m| m.as_str() == Some(member)))
        })
    })
}

/// IAM role bindings on the project or on a service account
///
/// A binding is not an object of its own; it exists while the target's
/// policy lists the member under the role.
#[derive(Debug, Clone, Default)]
pub struct IamBindingClient {
    gcloud: Gcloud,
}

impl IamBindingClient {
    pub fn new(gcloud: Gcloud) -> Self {
        Self { gcloud }
    }
}

#[async_trait]
impl ResourceClient for IamBindingClient {
    fn name(&self) -> &str {
        "gcloud-iam-binding"
    }

    async fn check_auth(&self, _ctx: &Context) -> Result<AuthStatus> {
        gcloud_auth(&self.gcloud).await
    }

    async fn create(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::IamBinding(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let command = binding_command(ctx, spec, "add-iam-policy-binding");
        self.gcloud.run(ctx, command).await?;
        Ok(())
    }

    async fn get_status(
        &self,
        ctx: &Context,
        descriptor: &ResourceDescriptor,
    ) -> Result<ExternalStatus> {
        let ResourceSpec::IamBinding(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let mut command = policy_target(ctx, spec);
        let resource = command.pop().unwrap_or_default();
        command.push("get-iam-policy".to_string());
        command.push(resource);

        let Some(policy) = self.gcloud.describe(ctx, command).await? else {
            return Ok(ExternalStatus::absent());
        };
        if binding_present(&policy, &spec.role, &spec.member) {
            Ok(ExternalStatus::present().with_raw(policy))
        } else {
            Ok(ExternalStatus::absent())
        }
    }

    async fn delete(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::IamBinding(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let command = binding_command(ctx, spec, "remove-iam-policy-binding");
        self.gcloud.run(ctx, command).await?;
        Ok(())
    }
}
