//! GKE, Kubernetes and Route 53 clients for gantry
//!
//! This crate implements [`ResourceClient`] for every resource kind gantry
//! knows about, by shelling out to the vendor CLIs.
//!
//! # Requirements
//!
//! - `gcloud` for networks, clusters, IAM and buckets
//! - `kubectl` for in-cluster objects (namespaces, ingresses, certificates)
//! - `aws` for Route 53 records
//!
//! Authentication is whatever each CLI is configured with; `check_auth`
//! reports the active identity.
//!
//! # Example
//!
//! ```ignore
//! use gantry_cloud::ClientRegistry;
//!
//! let mut registry = ClientRegistry::new();
//! gantry_cloud_gcp::register_all(&mut registry);
//! ```

pub mod command;
pub mod compute;
pub mod container;
pub mod dns;
pub mod error;
pub mod gcloud;
pub mod iam;
pub mod kubectl;
pub mod kubernetes;
pub mod route53;
pub mod status;
pub mod storage;

pub use compute::{NetworkClient, StaticAddressClient, SubnetClient};
pub use container::{ClusterClient, NodePoolClient};
pub use dns::DnsRecordClient;
pub use error::{FailureClass, GcpError, Result};
pub use gcloud::Gcloud;
pub use iam::{IamBindingClient, ServiceAccountClient};
pub use kubectl::Kubectl;
pub use kubernetes::{IngressClient, K8sServiceAccountClient, ManagedCertificateClient, NamespaceClient};
pub use route53::Route53;
pub use storage::BucketClient;

use gantry_cloud::{ClientRegistry, ResourceClient};
use gantry_core::ResourceKind;
use std::sync::Arc;

/// Register a client for every resource kind
pub fn register_all(registry: &mut ClientRegistry) {
    let gcloud = Gcloud::new();
    let kubectl = Kubectl::new();

    for kind in ResourceKind::ALL {
        let client: Arc<dyn ResourceClient> = match kind {
            ResourceKind::Network => Arc::new(NetworkClient::new(gcloud.clone())),
            ResourceKind::Subnet => Arc::new(SubnetClient::new(gcloud.clone())),
            ResourceKind::Cluster => Arc::new(ClusterClient::new(gcloud.clone())),
            ResourceKind::NodePool => {
                Arc::new(NodePoolClient::new(gcloud.clone(), kubectl.clone()))
            }
            ResourceKind::ServiceAccount => Arc::new(ServiceAccountClient::new(gcloud.clone())),
            ResourceKind::IamBinding => Arc::new(IamBindingClient::new(gcloud.clone())),
            ResourceKind::Bucket => Arc::new(BucketClient::new(gcloud.clone())),
            ResourceKind::StaticAddress => Arc::new(StaticAddressClient::new(gcloud.clone())),
            ResourceKind::Namespace => Arc::new(NamespaceClient::new(kubectl.clone())),
            ResourceKind::K8sServiceAccount => {
                Arc::new(K8sServiceAccountClient::new(kubectl.clone()))
            }
            ResourceKind::Ingress => Arc::new(IngressClient::new(kubectl.clone())),
            ResourceKind::ManagedCertificate => {
                Arc::new(ManagedCertificateClient::new(kubectl.clone()))
            }
            ResourceKind::DnsRecord => Arc::new(DnsRecordClient::new(Route53::new())),
        };
        registry.register(kind, client);
    }

    tracing::debug!(kinds = ResourceKind::ALL.len(), "Registered GCP clients");
}
