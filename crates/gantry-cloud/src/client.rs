//! Resource client trait definition

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use gantry_core::{Context, ResourceDescriptor, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Client for one kind of external resource
///
/// Implementations translate a descriptor into calls against the control
/// plane that owns the resource (cloud API, cluster API, DNS provider) and
/// classify failures as transient, permanent, not-found or already-exists.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Returns the client name (e.g., "gcloud-network", "kubectl-namespace")
    fn name(&self) -> &str;

    /// Check if the backing tool is installed and authenticated
    async fn check_auth(&self, _ctx: &Context) -> Result<AuthStatus> {
        Ok(AuthStatus::ok(self.name()))
    }

    /// Issue the create call; returns once the request is accepted
    async fn create(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()>;

    /// Bring an existing resource in line with the descriptor
    async fn update(&self, _ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        Err(CloudError::Permanent(format!(
            "{} does not support in-place update of '{}'",
            self.name(),
            descriptor.id
        )))
    }

    /// Observe the resource as it currently exists
    async fn get_status(
        &self,
        ctx: &Context,
        descriptor: &ResourceDescriptor,
    ) -> Result<ExternalStatus>;

    /// Issue the delete call
    async fn delete(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()>;

    /// Provider handle of the call last submitted for `descriptor`
    ///
    /// Clients whose readiness is tracked per submitted operation rather
    /// than per resource return it here; the executor stores it in the
    /// ledger so a later process keeps polling the same operation.
    fn operation_handle(&self, _descriptor: &ResourceDescriptor) -> Option<String> {
        None
    }

    /// Re-attach a handle recorded by an earlier process
    fn restore_operation(&self, _descriptor: &ResourceDescriptor, _handle: &str) {}
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Observed status of an external resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalStatus {
    pub exists: bool,

    /// Provider phase string (e.g. "RUNNING", "Active", "INSYNC")
    pub phase: Option<String>,

    /// Ready member count for grouped resources such as node pools
    pub ready_count: Option<u32>,

    /// Assigned address for ingresses and static addresses
    pub address: Option<String>,

    /// Human readable detail from the provider
    pub message: Option<String>,

    /// Raw provider payload
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl ExternalStatus {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn present() -> Self {
        Self {
            exists: true,
            ..Self::default()
        }
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn with_ready_count(mut self, count: u32) -> Self {
        self.ready_count = Some(count);
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }

    /// Short description for logs and timeout diagnostics
    pub fn describe(&self) -> String {
        if !self.exists {
            return "not found".to_string();
        }
        let mut parts = vec![format!(
            "phase={}",
            self.phase.as_deref().unwrap_or("unknown")
        )];
        if let Some(count) = self.ready_count {
            parts.push(format!("ready={}", count));
        }
        if let Some(address) = &self.address {
            parts.push(format!("address={}", address));
        }
        if let Some(message) = &self.message {
            parts.push(message.clone());
        }
        parts.join(" ")
    }
}

/// Clients indexed by resource kind
#[derive(Default, Clone)]
pub struct ClientRegistry {
    clients: HashMap<ResourceKind, Arc<dyn ResourceClient>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ResourceKind, client: Arc<dyn ResourceClient>) {
        tracing::debug!(kind = %kind, client = client.name(), "Registered client");
        self.clients.insert(kind, client);
    }

    pub fn get(&self, kind: ResourceKind) -> Result<Arc<dyn ResourceClient>> {
        self.clients
            .get(&kind)
            .cloned()
            .ok_or(CloudError::ClientNotRegistered(kind))
    }

    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<ResourceKind> = self.clients.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Distinct clients, for auth checks
    pub fn clients(&self) -> Vec<Arc<dyn ResourceClient>> {
        let mut seen: Vec<Arc<dyn ResourceClient>> = Vec::new();
        for kind in self.kinds() {
            let Some(client) = self.clients.get(&kind) else {
                continue;
            };
            if !seen.iter().any(|c| Arc::ptr_eq(c, client)) {
                seen.push(client.clone());
            }
        }
        seen
    }
}
