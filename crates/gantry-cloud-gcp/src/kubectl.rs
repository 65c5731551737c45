//! kubectl CLI wrapper
//!
//! Objects are applied as JSON manifests through stdin. The kube context
//! comes from the run context when set.

use crate::command::{KUBECTL, args};
use crate::error::{GcpError, Result};
use gantry_core::Context;
use serde_json::Value;

/// kubectl CLI wrapper
#[derive(Debug, Clone, Default)]
pub struct Kubectl;

impl Kubectl {
    pub fn new() -> Self {
        Self
    }

    fn base_args(ctx: &Context) -> Vec<String> {
        match &ctx.kube_context {
            Some(context) => vec![format!("--context={}", context)],
            None => Vec::new(),
        }
    }

    /// Check that kubectl is installed and can reach the cluster
    pub async fn check_auth(&self, ctx: &Context) -> Result<String> {
        if !KUBECTL.is_installed().await {
            return Err(KUBECTL.not_found());
        }

        let mut command = Self::base_args(ctx);
        command.extend(args(["auth", "can-i", "create", "namespaces"]));
        let answer = KUBECTL.run(&command, None).await?;
        if answer.trim() != "yes" {
            return Err(GcpError::AuthenticationFailed {
                tool: "kubectl",
                message: "current identity cannot create namespaces".to_string(),
            });
        }
        Ok(ctx
            .kube_context
            .clone()
            .unwrap_or_else(|| "current-context".to_string()))
    }

    /// Server-side apply a manifest
    pub async fn apply(&self, ctx: &Context, manifest: &Value) -> Result<()> {
        let mut command = Self::base_args(ctx);
        command.extend(args([
            "apply",
            "--server-side",
            "--field-manager=gantry",
            "-f",
            "-",
            "-o",
            "name",
        ]));
        let body = serde_json::to_string(manifest)?;
        KUBECTL.run(&command, Some(&body)).await?;
        Ok(())
    }

    /// Fetch one object; `None` when it does not exist
    pub async fn get(
        &self,
        ctx: &Context,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>> {
        let mut command = Self::base_args(ctx);
        command.extend(args(["get", kind, name, "-o", "json"]));
        if let Some(namespace) = namespace {
            command.push(format!("--namespace={}", namespace));
        }
        KUBECTL.run_json(&command).await
    }

    /// List objects matching a label selector
    pub async fn list(&self, ctx: &Context, kind: &str, selector: &str) -> Result<Value> {
        let mut command = Self::base_args(ctx);
        command.extend(args(["get", kind, "-l", selector, "-o", "json"]));
        let output = KUBECTL.run(&command, None).await?;
        Ok(serde_json::from_str(&output)?)
    }

    /// Delete an object without waiting for finalizers
    pub async fn delete(
        &self,
        ctx: &Context,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        let mut command = Self::base_args(ctx);
        command.extend(args(["delete", kind, name, "--wait=false"]));
        if let Some(namespace) = namespace {
            command.push(format!("--namespace={}", namespace));
        }
        KUBECTL.run(&command, None).await?;
        Ok(())
    }
}
