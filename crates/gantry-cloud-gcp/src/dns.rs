//! DNS record client backed by Route 53
//!
//! Route 53 reports propagation per change, not per record, so the client
//! remembers the last change it submitted for each record and hands it to
//! the ledger as the operation handle. A record found without a known change
//! reports an unknown phase and never counts as in sync.

use crate::route53::{Route53, record_values};
use crate::status::spec_mismatch;
use async_trait::async_trait;
use gantry_cloud::{AuthStatus, CloudError, ExternalStatus, ResourceClient, Result};
use gantry_core::{Context, DnsRecordSpec, ResourceDescriptor, ResourceSpec};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Phase reported when no submitted change is known for a record
pub const UNKNOWN_CHANGE_PHASE: &str = "UNKNOWN";

/// Route 53 record sets
#[derive(Debug, Default)]
pub struct DnsRecordClient {
    route53: Route53,
    changes: Mutex<HashMap<String, String>>,
}

impl DnsRecordClient {
    pub fn new(route53: Route53) -> Self {
        Self {
            route53,
            changes: Mutex::new(HashMap::new()),
        }
    }

    fn record_key(spec: &DnsRecordSpec) -> String {
        format!("{}/{}/{}", spec.hosted_zone, spec.name, spec.record_type)
    }

    fn changes(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.changes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remember(&self, spec: &DnsRecordSpec, change_id: &str) {
        self.changes()
            .insert(Self::record_key(spec), change_id.to_string());
    }

    fn pending_change(&self, spec: &DnsRecordSpec) -> Option<String> {
        self.changes().get(&Self::record_key(spec)).cloned()
    }

    async fn submit(&self, action: &str, spec: &DnsRecordSpec) -> Result<()> {
        let change = self.route53.change(action, spec, &spec.values).await?;
        tracing::debug!(
            record = %spec.name,
            change = %change.id,
            status = %change.status,
            "Submitted {} change",
            action
        );
        self.remember(spec, &change.id);
        Ok(())
    }
}

#[async_trait]
impl ResourceClient for DnsRecordClient {
    fn name(&self) -> &str {
        "route53-record"
    }

    async fn check_auth(&self, _ctx: &Context) -> Result<AuthStatus> {
        Ok(match self.route53.check_auth().await {
            Ok(arn) => AuthStatus::ok(arn),
            Err(e) => AuthStatus::failed(e.to_string()),
        })
    }

    async fn create(&self, _ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::DnsRecord(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        // An existing record set is taken over at the declared values so
        // there is a change to track
        match self.submit("CREATE", spec).await {
            Err(CloudError::ResourceAlreadyExists(detail)) => {
                tracing::info!(record = %spec.name, %detail, "Record exists, upserting");
                self.submit("UPSERT", spec).await
            }
            other => other,
        }
    }

    async fn update(&self, _ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::DnsRecord(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        self.submit("UPSERT", spec).await
    }

    async fn get_status(
        &self,
        _ctx: &Context,
        descriptor: &ResourceDescriptor,
    ) -> Result<ExternalStatus> {
        let ResourceSpec::DnsRecord(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        let Some(record) = self.route53.find_record(spec).await? else {
            return Ok(ExternalStatus::absent());
        };

        let mut status = match self.pending_change(spec) {
            Some(id) => ExternalStatus::present().with_phase(self.route53.get_change(&id).await?.status),
            None => ExternalStatus::present()
                .with_phase(UNKNOWN_CHANGE_PHASE)
                .with_message("no submitted change is known for this record"),
        };
        if let Some(first) = record_values(&record).first() {
            status = status.with_address(first.clone());
        }
        Ok(status.with_raw(record))
    }

    async fn delete(&self, _ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::DnsRecord(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };

        // DELETE must name the current TTL and values exactly
        let Some(record) = self.route53.find_record(spec).await? else {
            return Err(CloudError::ResourceNotFound(spec.name.clone()));
        };
        let current = DnsRecordSpec {
            ttl: record["TTL"]
                .as_u64()
                .and_then(|ttl| u32::try_from(ttl).ok())
                .unwrap_or(spec.ttl),
            ..spec.clone()
        };
        let values = record_values(&record);
        self.route53.change("DELETE", &current, &values).await?;
        self.changes().remove(&Self::record_key(spec));
        Ok(())
    }

    fn operation_handle(&self, descriptor: &ResourceDescriptor) -> Option<String> {
        match &descriptor.spec {
            ResourceSpec::DnsRecord(spec) => self.pending_change(spec),
            _ => None,
        }
    }

    fn restore_operation(&self, descriptor: &ResourceDescriptor, handle: &str) {
        if let ResourceSpec::DnsRecord(spec) = &descriptor.spec {
            self.remember(spec, handle);
        }
    }
}
