//! Readiness oracle
//!
//! Decides from an observed [`ExternalStatus`] whether a resource has
//! reached a usable state. Polling cadence and timeouts are per kind.

use crate::client::ExternalStatus;
use gantry_core::{ResourceDescriptor, ResourceKind, ResourceSpec};
use std::collections::HashMap;
use std::time::Duration;

/// Outcome of one readiness evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Keep polling; the string describes what is still missing
    NotReady(String),
    /// Terminal failure; stop polling
    Failed(String),
}

/// Polling cadence for one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub const fn new(interval_secs: u64, timeout_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn default_for(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Namespace | ResourceKind::K8sServiceAccount => Self::new(2, 120),
            ResourceKind::ServiceAccount
            | ResourceKind::IamBinding
            | ResourceKind::Bucket
            | ResourceKind::StaticAddress => Self::new(5, 300),
            ResourceKind::Network | ResourceKind::Subnet => Self::new(10, 600),
            ResourceKind::DnsRecord => Self::new(10, 900),
            ResourceKind::Ingress => Self::new(15, 1200),
            ResourceKind::NodePool => Self::new(20, 1800),
            ResourceKind::Cluster => Self::new(30, 2400),
            ResourceKind::ManagedCertificate => Self::new(30, 5400),
        }
    }
}

/// Poll policies for every kind, with overrides
#[derive(Debug, Clone, Default)]
pub struct ReadinessPolicies {
    overrides: HashMap<ResourceKind, PollPolicy>,
}

impl ReadinessPolicies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, kind: ResourceKind, policy: PollPolicy) -> Self {
        self.overrides.insert(kind, policy);
        self
    }

    /// Same policy for every kind
    pub fn uniform(policy: PollPolicy) -> Self {
        Self {
            overrides: ResourceKind::ALL.iter().map(|k| (*k, policy)).collect(),
        }
    }

    pub fn policy_for(&self, kind: ResourceKind) -> PollPolicy {
        self.overrides
            .get(&kind)
            .copied()
            .unwrap_or_else(|| PollPolicy::default_for(kind))
    }
}

/// Observation history for the current readiness wait
#[derive(Debug, Clone, Default)]
pub struct PollProgress {
    /// Polls made so far, including the current one
    pub polls: u32,
    /// Consecutive polls that reported the current phase
    pub phase_streak: u32,
    last_phase: Option<String>,
}

impl PollProgress {
    pub fn observe(&mut self, status: &ExternalStatus) {
        self.polls += 1;
        if status.phase.is_some() && status.phase == self.last_phase {
            self.phase_streak += 1;
        } else {
            self.phase_streak = 1;
            self.last_phase = status.phase.clone();
        }
    }
}

/// Readiness predicate
pub trait ReadinessOracle: Send + Sync {
    fn evaluate(
        &self,
        descriptor: &ResourceDescriptor,
        status: &ExternalStatus,
        progress: &PollProgress,
    ) -> Readiness;
}

/// Per-kind readiness rules
#[derive(Debug, Clone)]
pub struct KindOracle {
    /// Consecutive `FailedNotVisible` observations tolerated on a
    /// certificate before it is declared failed
    pub certificate_not_visible_tolerance: u32,
}

impl Default for KindOracle {
    fn default() -> Self {
        Self {
            certificate_not_visible_tolerance: 10,
        }
    }
}

fn phase_is(status: &ExternalStatus, expected: &[&str]) -> bool {
    status
        .phase
        .as_deref()
        .is_some_and(|p| expected.iter().any(|e| p.eq_ignore_ascii_case(e)))
}

fn waiting(status: &ExternalStatus) -> Readiness {
    Readiness::NotReady(status.describe())
}

impl ReadinessOracle for KindOracle {
    fn evaluate(
        &self,
        descriptor: &ResourceDescriptor,
        status: &ExternalStatus,
        progress: &PollProgress,
    ) -> Readiness {
        if !status.exists {
            return Readiness::NotReady("not found yet".to_string());
        }

        match &descriptor.spec {
            ResourceSpec::StaticAddress(_) => {
                if phase_is(status, &["RESERVED", "IN_USE"]) {
                    Readiness::Ready
                } else {
                    waiting(status)
                }
            }
            ResourceSpec::Namespace(_) => {
                if phase_is(status, &["Active"]) {
                    Readiness::Ready
                } else if phase_is(status, &["Terminating"]) {
                    Readiness::Failed("namespace is terminating".to_string())
                } else {
                    waiting(status)
                }
            }
            ResourceSpec::Cluster(_) => {
                if phase_is(status, &["RUNNING"]) {
                    Readiness::Ready
                } else if phase_is(status, &["ERROR", "STOPPING"]) {
                    Readiness::Failed(status.describe())
                } else {
                    waiting(status)
                }
            }
            ResourceSpec::NodePool(spec) => {
                if phase_is(status, &["ERROR"]) {
                    return Readiness::Failed(status.describe());
                }
                let ready = status.ready_count.unwrap_or(0);
                if phase_is(status, &["RUNNING"]) && ready >= spec.min_nodes {
                    Readiness::Ready
                } else {
                    Readiness::NotReady(format!(
                        "{} (need {} ready nodes)",
                        status.describe(),
                        spec.min_nodes
                    ))
                }
            }
            ResourceSpec::Ingress(_) => {
                if status.address.as_deref().is_some_and(|a| !a.is_empty()) {
                    Readiness::Ready
                } else {
                    Readiness::NotReady("no load balancer address assigned".to_string())
                }
            }
            ResourceSpec::ManagedCertificate(_) => self.evaluate_certificate(status, progress),
            ResourceSpec::DnsRecord(_) => {
                if phase_is(status, &["INSYNC"]) {
                    Readiness::Ready
                } else {
                    waiting(status)
                }
            }
            ResourceSpec::Network(_)
            | ResourceSpec::Subnet(_)
            | ResourceSpec::ServiceAccount(_)
            | ResourceSpec::IamBinding(_)
            | ResourceSpec::Bucket(_)
            | ResourceSpec::K8sServiceAccount(_) => Readiness::Ready,
        }
    }
}

impl KindOracle {
    fn evaluate_certificate(&self, status: &ExternalStatus, progress: &PollProgress) -> Readiness {
        let Some(phase) = status.phase.as_deref() else {
            return waiting(status);
        };

        match phase {
            "Active" => Readiness::Ready,
            "Provisioning" => waiting(status),
            // DNS may not point at the load balancer yet
            "FailedNotVisible" => {
                if progress.phase_streak >= self.certificate_not_visible_tolerance {
                    Readiness::Failed(format!(
                        "domain not visible after {} consecutive checks",
                        progress.phase_streak
                    ))
                } else {
                    waiting(status)
                }
            }
            "FailedCaaChecking" => waiting(status),
            other if other.starts_with("Failed") => Readiness::Failed(status.describe()),
            _ => waiting(status),
        }
    }
}
