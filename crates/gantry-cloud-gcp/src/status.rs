//! Normalising raw CLI output into [`ExternalStatus`]

use gantry_cloud::{CloudError, ExternalStatus};
use gantry_core::ResourceDescriptor;
use serde_json::Value;

/// Present when the describe call returned anything
pub fn describe_status(found: Option<Value>) -> ExternalStatus {
    match found {
        Some(raw) => ExternalStatus::present().with_raw(raw),
        None => ExternalStatus::absent(),
    }
}

/// GKE clusters and node pools: `status` plus `statusMessage`
pub fn gke_status(raw: &Value) -> ExternalStatus {
    let mut status = ExternalStatus::present().with_raw(raw.clone());
    if let Some(phase) = raw["status"].as_str() {
        status = status.with_phase(phase);
    }
    if let Some(message) = raw["statusMessage"].as_str().filter(|m| !m.is_empty()) {
        status = status.with_message(message);
    }
    status
}

/// Nodes in a `kubectl get nodes -o json` listing whose Ready condition is True
pub fn count_ready_nodes(listing: &Value) -> u32 {
    listing["items"]
        .as_array()
        .map(|nodes| {
            nodes
                .iter()
                .filter(|node| {
                    node["status"]["conditions"]
                        .as_array()
                        .is_some_and(|conditions| {
                            conditions
                                .iter()
                                .any(|c| c["type"] == "Ready" && c["status"] == "True")
                        })
                })
                .count() as u32
        })
        .unwrap_or(0)
}

/// Kubernetes objects with `status.phase` (namespaces)
pub fn phase_status(raw: &Value) -> ExternalStatus {
    let mut status = ExternalStatus::present().with_raw(raw.clone());
    if let Some(phase) = raw["status"]["phase"].as_str() {
        status = status.with_phase(phase);
    }
    status
}

/// Ingress: first load balancer IP or hostname
pub fn ingress_status(raw: &Value) -> ExternalStatus {
    let mut status = ExternalStatus::present().with_raw(raw.clone());
    let address = raw["status"]["loadBalancer"]["ingress"]
        .as_array()
        .and_then(|entries| entries.first())
        .and_then(|entry| entry["ip"].as_str().or_else(|| entry["hostname"].as_str()));
    if let Some(address) = address {
        status = status.with_address(address);
    }
    status
}

/// ManagedCertificate: `status.certificateStatus` and per-domain detail
///
/// While the certificate is still `Provisioning`, a failing domain status
/// (`FailedNotVisible` and friends) is reported as the phase instead.
pub fn certificate_status(raw: &Value) -> ExternalStatus {
    let mut status = ExternalStatus::present().with_raw(raw.clone());
    let domains: Vec<(&str, &str)> = raw["status"]["domainStatus"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|d| Some((d["domain"].as_str()?, d["status"].as_str()?)))
                .collect()
        })
        .unwrap_or_default();

    let overall = raw["status"]["certificateStatus"].as_str();
    let failing = domains
        .iter()
        .map(|(_, s)| *s)
        .find(|s| s.starts_with("Failed"));
    let phase = match (overall, failing) {
        (Some("Provisioning") | None, Some(domain)) => Some(domain),
        (overall, _) => overall,
    };
    if let Some(phase) = phase {
        status = status.with_phase(phase);
    }

    if !domains.is_empty() {
        let detail: Vec<String> = domains
            .iter()
            .map(|(domain, s)| format!("{}={}", domain, s))
            .collect();
        status = status.with_message(detail.join(", "));
    }
    status
}

/// The descriptor's spec does not belong to this client
pub(crate) fn spec_mismatch(client: &str, descriptor: &ResourceDescriptor) -> CloudError {
    CloudError::Permanent(format!(
        "{} cannot handle '{}' of kind {}",
        client,
        descriptor.id,
        descriptor.kind()
    ))
}
