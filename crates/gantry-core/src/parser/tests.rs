use super::*;
use crate::model::ResourceSpec;

const PROJECT: &str = r#"
    project "acme-prod" {
        region "asia-northeast1"
        zone "asia-northeast1-a"
    }
"#;

fn with_project(body: &str) -> String {
    format!("{}\n{}", PROJECT, body)
}

#[test]
fn test_parse_project_context() {
    let doc = parse_kdl_string(PROJECT).unwrap();
    assert_eq!(doc.context.project, "acme-prod");
    assert_eq!(doc.context.region, "asia-northeast1");
    assert_eq!(doc.context.zone.as_deref(), Some("asia-northeast1-a"));
    assert!(doc.context.kube_context.is_none());
    assert!(doc.descriptors.is_empty());
}

#[test]
fn test_missing_project_is_error() {
    let kdl = r#"
        network "vpc" {}
    "#;
    assert!(matches!(parse_kdl_string(kdl), Err(FlowError::MissingProject)));
}

#[test]
fn test_parse_network_subnet_cluster_chain() {
    let kdl = with_project(
        r#"
        network "vpc" {
            name "acme-vpc"
        }
        subnet "subnet" {
            depends-on "vpc"
            network "acme-vpc"
            range "10.0.0.0/20"
            secondary-range "pods" "10.4.0.0/14"
            secondary-range "services" "10.8.0.0/20"
        }
        cluster "gke" {
            depends-on "subnet"
            name "main"
            network "acme-vpc"
            subnetwork "subnet"
            release-channel "regular"
            workload-identity
            pods-range "pods"
            services-range "services"
        }
    "#,
    );

    let doc = parse_kdl_string(&kdl).unwrap();
    assert_eq!(doc.descriptors.len(), 3);

    let subnet = doc.get("subnet").unwrap();
    assert!(subnet.depends_on.contains("vpc"));
    match &subnet.spec {
        ResourceSpec::Subnet(s) => {
            assert_eq!(s.name, "subnet");
            assert_eq!(s.range, "10.0.0.0/20");
            assert_eq!(s.secondary_ranges["pods"], "10.4.0.0/14");
            assert_eq!(s.secondary_ranges.len(), 2);
        }
        other => panic!("Expected subnet spec, got {:?}", other),
    }

    match &doc.get("gke").unwrap().spec {
        ResourceSpec::Cluster(c) => {
            assert_eq!(c.name, "main");
            assert!(c.workload_identity);
            assert_eq!(c.release_channel.as_deref(), Some("regular"));
        }
        other => panic!("Expected cluster spec, got {:?}", other),
    }
}

#[test]
fn test_parse_node_pool_with_snake_case_fields() {
    let kdl = with_project(
        r#"
        node-pool "pool" {
            cluster "main"
            machine_type "n2-standard-8"
            min_nodes 2
            max_nodes 5
            disk-size 100
            spot #true
        }
    "#,
    );

    let doc = parse_kdl_string(&kdl).unwrap();
    match &doc.descriptors[0].spec {
        ResourceSpec::NodePool(p) => {
            assert_eq!(p.name, "pool");
            assert_eq!(p.machine_type, "n2-standard-8");
            assert_eq!(p.min_nodes, 2);
            assert_eq!(p.max_nodes, 5);
            assert_eq!(p.disk_size_gb, Some(100));
            assert!(p.spot);
        }
        other => panic!("Expected node pool spec, got {:?}", other),
    }
}

#[test]
fn test_node_pool_max_below_min_is_rejected() {
    let kdl = with_project(
        r#"
        node-pool "pool" {
            cluster "main"
            min-nodes 3
            max-nodes 1
        }
    "#,
    );

    match parse_kdl_string(&kdl) {
        Err(FlowError::InvalidValue { field, .. }) => assert_eq!(field, "max-nodes"),
        other => panic!("Expected InvalidValue, got {:?}", other),
    }
}

#[test]
fn test_parse_kubernetes_resources() {
    let kdl = with_project(
        r#"
        namespace "argocd" {
            labels {
                team "platform"
            }
        }
        managed-certificate "cert" {
            depends-on "argocd"
            name "argocd-cert"
            namespace "argocd"
            domains "argocd.example.com"
        }
        ingress "argocd-ingress" {
            depends-on "argocd" "cert"
            namespace "argocd"
            host "argocd.example.com"
            service "argocd-server"
            port 443
            class "gce"
            static-address "argocd-ip"
            certificate "argocd-cert"
        }
    "#,
    );

    let doc = parse_kdl_string(&kdl).unwrap();
    let ingress = doc.get("argocd-ingress").unwrap();
    assert_eq!(ingress.depends_on.len(), 2);
    match &ingress.spec {
        ResourceSpec::Ingress(i) => {
            assert_eq!(i.port, 443);
            assert_eq!(i.ingress_class.as_deref(), Some("gce"));
            assert_eq!(i.certificate.as_deref(), Some("argocd-cert"));
        }
        other => panic!("Expected ingress spec, got {:?}", other),
    }

    match &doc.get("argocd").unwrap().spec {
        ResourceSpec::Namespace(n) => assert_eq!(n.labels["team"], "platform"),
        other => panic!("Expected namespace spec, got {:?}", other),
    }
}

#[test]
fn test_parse_dns_record_defaults() {
    let kdl = with_project(
        r#"
        dns-record "argocd-dns" {
            hosted-zone "Z0123456789"
            name "argocd.example.com"
            values "34.120.0.10"
        }
    "#,
    );

    let doc = parse_kdl_string(&kdl).unwrap();
    match &doc.descriptors[0].spec {
        ResourceSpec::DnsRecord(r) => {
            assert_eq!(r.record_type, "A");
            assert_eq!(r.ttl, 300);
            assert_eq!(r.values, vec!["34.120.0.10".to_string()]);
        }
        other => panic!("Expected dns record spec, got {:?}", other),
    }
}

#[test]
fn test_unknown_kind_is_error() {
    let kdl = with_project(r#"vm "web" {}"#);
    assert!(matches!(parse_kdl_string(&kdl), Err(FlowError::UnknownKind(k)) if k == "vm"));
}

#[test]
fn test_unknown_field_is_error() {
    let kdl = with_project(
        r#"
        bucket "assets" {
            locaton "ASIA"
        }
    "#,
    );

    match parse_kdl_string(&kdl) {
        Err(FlowError::UnknownField { id, field, .. }) => {
            assert_eq!(id, "assets");
            assert_eq!(field, "locaton");
        }
        other => panic!("Expected UnknownField, got {:?}", other),
    }
}

#[test]
fn test_missing_required_field_is_error() {
    let kdl = with_project(
        r#"
        subnet "subnet" {
            network "acme-vpc"
        }
    "#,
    );

    match parse_kdl_string(&kdl) {
        Err(FlowError::MissingField { field, .. }) => assert_eq!(field, "range"),
        other => panic!("Expected MissingField, got {:?}", other),
    }
}

#[test]
fn test_duplicate_id_is_error() {
    let kdl = with_project(
        r#"
        bucket "assets" {}
        namespace "assets" {}
    "#,
    );
    assert!(matches!(parse_kdl_string(&kdl), Err(FlowError::DuplicateId(id)) if id == "assets"));
}

#[test]
fn test_dependency_on_undeclared_id_is_error() {
    let kdl = with_project(
        r#"
        namespace "argocd" {
            depends-on "gke"
        }
    "#,
    );
    assert!(matches!(
        parse_kdl_string(&kdl),
        Err(FlowError::UnknownDependency { dependency, .. }) if dependency == "gke"
    ));
}
