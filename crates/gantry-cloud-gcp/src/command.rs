//! External command runner shared by the CLI wrappers

use crate::error::{GcpError, Result};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// A CLI tool the clients shell out to
#[derive(Debug, Clone, Copy)]
pub struct Tool {
    pub program: &'static str,
    pub install_hint: &'static str,
}

pub const GCLOUD: Tool = Tool {
    program: "gcloud",
    install_hint: "https://cloud.google.com/sdk/docs/install",
};

pub const KUBECTL: Tool = Tool {
    program: "kubectl",
    install_hint: "gcloud components install kubectl",
};

pub const AWS: Tool = Tool {
    program: "aws",
    install_hint: "https://docs.aws.amazon.com/cli/latest/userguide/getting-started-install.html",
};

impl Tool {
    /// Run the tool and return stdout
    ///
    /// `stdin`, when given, is written to the child's standard input.
    pub async fn run(&self, args: &[String], stdin: Option<&str>) -> Result<String> {
        let mut cmd = Command::new(self.program);
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        tracing::debug!("Running: {} {}", self.program, args.join(" "));

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
            // Dropping the pipe closes it so the child sees EOF
            drop(pipe);
        }

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::debug!(tool = self.program, %stderr, "Command failed");
            return Err(GcpError::CommandFailed {
                tool: self.program,
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run the tool and parse stdout as JSON; a not-found failure is `None`
    pub async fn run_json(&self, args: &[String]) -> Result<Option<serde_json::Value>> {
        match self.run(args, None).await {
            Ok(stdout) if stdout.trim().is_empty() => Ok(Some(serde_json::Value::Null)),
            Ok(stdout) => Ok(Some(serde_json::from_str(&stdout)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether the tool is on PATH
    pub async fn is_installed(&self) -> bool {
        Command::new("which")
            .arg(self.program)
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn not_found(&self) -> GcpError {
        GcpError::ToolNotFound {
            tool: self.program,
            hint: self.install_hint,
        }
    }

    fn spawn_error(&self, e: std::io::Error) -> GcpError {
        if e.kind() == std::io::ErrorKind::NotFound {
            self.not_found()
        } else {
            GcpError::IoError(e)
        }
    }
}

/// Build an owned argument list
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
