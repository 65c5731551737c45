//! gcloud CLI wrapper
//!
//! Every call carries the project from the run context explicitly; the
//! gcloud default project is never consulted.

use crate::command::GCLOUD;
use crate::error::{GcpError, Result};
use gantry_core::Context;
use serde_json::Value;

/// gcloud CLI wrapper
#[derive(Debug, Clone, Default)]
pub struct Gcloud;

impl Gcloud {
    pub fn new() -> Self {
        Self
    }

    /// Check that gcloud is installed and has an active account
    pub async fn check_auth(&self) -> Result<String> {
        if !GCLOUD.is_installed().await {
            return Err(GCLOUD.not_found());
        }

        let output = GCLOUD
            .run(
                &crate::command::args([
                    "auth",
                    "list",
                    "--filter=status:ACTIVE",
                    "--format=value(account)",
                ]),
                None,
            )
            .await?;

        let account = output.lines().next().unwrap_or("").trim().to_string();
        if account.is_empty() {
            return Err(GcpError::AuthenticationFailed {
                tool: "gcloud",
                message: "no active account; run `gcloud auth login`".to_string(),
            });
        }
        Ok(account)
    }

    /// Run a mutating command (create/update/delete)
    pub async fn run(&self, ctx: &Context, mut args: Vec<String>) -> Result<String> {
        args.push(format!("--project={}", ctx.project));
        args.push("--quiet".to_string());
        GCLOUD.run(&args, None).await
    }

    /// Run a describe-style command; `None` when the resource does not exist
    pub async fn describe(&self, ctx: &Context, mut args: Vec<String>) -> Result<Option<Value>> {
        args.push(format!("--project={}", ctx.project));
        args.push("--format=json".to_string());
        GCLOUD.run_json(&args).await
    }
}
