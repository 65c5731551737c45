//! リソース種別

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FlowError;

/// インフラリソースの種別
///
/// KDL上のノード名 (`node-pool` など) と1対1で対応します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Network,
    Subnet,
    Cluster,
    NodePool,
    ServiceAccount,
    IamBinding,
    Bucket,
    StaticAddress,
    Namespace,
    K8sServiceAccount,
    Ingress,
    ManagedCertificate,
    DnsRecord,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 13] = [
        ResourceKind::Network,
        ResourceKind::Subnet,
        ResourceKind::Cluster,
        ResourceKind::NodePool,
        ResourceKind::ServiceAccount,
        ResourceKind::IamBinding,
        ResourceKind::Bucket,
        ResourceKind::StaticAddress,
        ResourceKind::Namespace,
        ResourceKind::K8sServiceAccount,
        ResourceKind::Ingress,
        ResourceKind::ManagedCertificate,
        ResourceKind::DnsRecord,
    ];

    /// KDLノード名
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::Cluster => "cluster",
            ResourceKind::NodePool => "node-pool",
            ResourceKind::ServiceAccount => "service-account",
            ResourceKind::IamBinding => "iam-binding",
            ResourceKind::Bucket => "bucket",
            ResourceKind::StaticAddress => "static-address",
            ResourceKind::Namespace => "namespace",
            ResourceKind::K8sServiceAccount => "k8s-service-account",
            ResourceKind::Ingress => "ingress",
            ResourceKind::ManagedCertificate => "managed-certificate",
            ResourceKind::DnsRecord => "dns-record",
        }
    }

    /// Kubernetes API 経由で操作するリソースかどうか
    pub fn is_kubernetes(&self) -> bool {
        matches!(
            self,
            ResourceKind::Namespace
                | ResourceKind::K8sServiceAccount
                | ResourceKind::Ingress
                | ResourceKind::ManagedCertificate
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| FlowError::UnknownKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_roundtrip_through_from_str() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_serde_name_matches_node_name() {
        let json = serde_json::to_string(&ResourceKind::K8sServiceAccount).unwrap();
        assert_eq!(json, "\"k8s-service-account\"");
        let json = serde_json::to_string(&ResourceKind::NodePool).unwrap();
        assert_eq!(json, "\"node-pool\"");
    }

    #[test]
    fn test_unknown_kind() {
        assert!(matches!(
            "vm".parse::<ResourceKind>(),
            Err(FlowError::UnknownKind(k)) if k == "vm"
        ));
    }
}
