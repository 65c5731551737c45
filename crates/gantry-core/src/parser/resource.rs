//! リソースノードのパース

use super::body::Body;
use crate::error::{FlowError, Result};
use crate::model::*;
use kdl::KdlNode;

/// project ノードをパース
pub fn parse_project(node: &KdlNode) -> Result<Context> {
    let project = node
        .entries()
        .first()
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| FlowError::InvalidConfig("project requires a GCP project id".to_string()))?
        .to_string();

    let mut body = Body::new("project", &project, node);
    let context = Context {
        region: body.require_string("region")?,
        zone: body.string("zone")?,
        kube_context: body.string("kube-context")?,
        project,
    };
    body.finish()?;

    Ok(context)
}

/// リソースノードをパース
///
/// ノード名が種別、最初の引数がID、子ノードが種別固有のフィールドと `depends-on`。
pub fn parse_resource(kind: ResourceKind, node: &KdlNode) -> Result<ResourceDescriptor> {
    let id = node
        .entries()
        .first()
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| FlowError::InvalidConfig(format!("{} requires an id", kind)))?
        .to_string();

    let mut body = Body::new(kind.as_str(), &id, node);
    let depends_on = body.strings("depends-on")?;

    let spec = match kind {
        ResourceKind::Network => ResourceSpec::Network(NetworkSpec {
            name: name_or_id(&mut body, &id)?,
            auto_subnets: body.flag("auto-subnets")?,
            routing_mode: body.string("routing-mode")?,
        }),
        ResourceKind::Subnet => ResourceSpec::Subnet(SubnetSpec {
            name: name_or_id(&mut body, &id)?,
            network: body.require_string("network")?,
            region: body.string("region")?,
            range: body.require_string("range")?,
            secondary_ranges: body.pairs("secondary-range")?,
        }),
        ResourceKind::Cluster => ResourceSpec::Cluster(ClusterSpec {
            name: name_or_id(&mut body, &id)?,
            location: body.string("location")?,
            network: body.string("network")?,
            subnetwork: body.string("subnetwork")?,
            release_channel: body.string("release-channel")?,
            workload_identity: body.flag("workload-identity")?,
            pods_range: body.string("pods-range")?,
            services_range: body.string("services-range")?,
        }),
        ResourceKind::NodePool => parse_node_pool(&mut body, &id)?,
        ResourceKind::ServiceAccount => ResourceSpec::ServiceAccount(ServiceAccountSpec {
            account_id: match body.string("account-id")? {
                Some(account_id) => account_id,
                None => id.clone(),
            },
            display_name: body.string("display-name")?,
        }),
        ResourceKind::IamBinding => ResourceSpec::IamBinding(IamBindingSpec {
            member: body.require_string("member")?,
            role: body.require_string("role")?,
            service_account: body.string("service-account")?,
        }),
        ResourceKind::Bucket => ResourceSpec::Bucket(BucketSpec {
            name: name_or_id(&mut body, &id)?,
            location: body.string("location")?,
            storage_class: body.string("storage-class")?,
            uniform_access: body.flag("uniform-access")?,
        }),
        ResourceKind::StaticAddress => ResourceSpec::StaticAddress(StaticAddressSpec {
            name: name_or_id(&mut body, &id)?,
            global: body.flag("global")?,
            region: body.string("region")?,
        }),
        ResourceKind::Namespace => ResourceSpec::Namespace(NamespaceSpec {
            name: name_or_id(&mut body, &id)?,
            labels: body.map("labels")?,
        }),
        ResourceKind::K8sServiceAccount => {
            ResourceSpec::K8sServiceAccount(K8sServiceAccountSpec {
                name: name_or_id(&mut body, &id)?,
                namespace: body.require_string("namespace")?,
                gcp_service_account: body.string("gcp-service-account")?,
            })
        }
        ResourceKind::Ingress => parse_ingress(&mut body, &id)?,
        ResourceKind::ManagedCertificate => {
            let domains = body.strings("domains")?;
            if domains.is_empty() {
                return Err(FlowError::MissingField {
                    kind: kind.to_string(),
                    id,
                    field: "domains".to_string(),
                });
            }
            ResourceSpec::ManagedCertificate(ManagedCertificateSpec {
                name: name_or_id(&mut body, &id)?,
                namespace: body.require_string("namespace")?,
                domains,
            })
        }
        ResourceKind::DnsRecord => {
            let values = body.strings("values")?;
            if values.is_empty() {
                return Err(FlowError::MissingField {
                    kind: kind.to_string(),
                    id,
                    field: "values".to_string(),
                });
            }
            ResourceSpec::DnsRecord(DnsRecordSpec {
                hosted_zone: body.require_string("hosted-zone")?,
                name: body.require_string("name")?,
                record_type: body.string("type")?.unwrap_or_else(|| "A".to_string()),
                ttl: body.u32("ttl")?.unwrap_or(300),
                values,
            })
        }
    };

    body.finish()?;

    Ok(ResourceDescriptor {
        id,
        spec,
        depends_on: depends_on.into_iter().collect(),
    })
}

fn name_or_id(body: &mut Body<'_>, id: &str) -> Result<String> {
    Ok(body.string("name")?.unwrap_or_else(|| id.to_string()))
}

fn parse_node_pool(body: &mut Body<'_>, id: &str) -> Result<ResourceSpec> {
    let name = name_or_id(body, id)?;
    let cluster = body.require_string("cluster")?;
    let min_nodes = body.require_u32("min-nodes")?;
    let max_nodes = body.u32("max-nodes")?.unwrap_or(min_nodes);

    if max_nodes < min_nodes {
        return Err(FlowError::InvalidValue {
            kind: ResourceKind::NodePool.to_string(),
            id: id.to_string(),
            field: "max-nodes".to_string(),
            message: format!("min-nodes ({}) 以上にしてください", min_nodes),
        });
    }

    Ok(ResourceSpec::NodePool(NodePoolSpec {
        name,
        cluster,
        location: body.string("location")?,
        machine_type: body
            .string("machine-type")?
            .unwrap_or_else(|| "e2-standard-4".to_string()),
        min_nodes,
        max_nodes,
        disk_size_gb: body.u32("disk-size")?,
        spot: body.flag("spot")?,
        service_account: body.string("service-account")?,
    }))
}

fn parse_ingress(body: &mut Body<'_>, id: &str) -> Result<ResourceSpec> {
    let port = body.require_u32("port")?;
    let port = u16::try_from(port).map_err(|_| FlowError::InvalidValue {
        kind: ResourceKind::Ingress.to_string(),
        id: id.to_string(),
        field: "port".to_string(),
        message: format!("ポート番号が範囲外です: {}", port),
    })?;

    Ok(ResourceSpec::Ingress(IngressSpec {
        name: name_or_id(body, id)?,
        namespace: body.require_string("namespace")?,
        host: body.string("host")?,
        service: body.require_string("service")?,
        port,
        ingress_class: body.string("class")?,
        static_address: body.string("static-address")?,
        certificate: body.string("certificate")?,
    }))
}
