//! リソース種別ごとの設定
//!
//! `ResourceSpec` は種別タグ付きの列挙型で、各バリアントが種別固有のフィールドを持ちます。
//! 一度プランに載った spec は実行中に変更されません。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::kind::ResourceKind;

/// 種別固有の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResourceSpec {
    Network(NetworkSpec),
    Subnet(SubnetSpec),
    Cluster(ClusterSpec),
    NodePool(NodePoolSpec),
    ServiceAccount(ServiceAccountSpec),
    IamBinding(IamBindingSpec),
    Bucket(BucketSpec),
    StaticAddress(StaticAddressSpec),
    Namespace(NamespaceSpec),
    K8sServiceAccount(K8sServiceAccountSpec),
    Ingress(IngressSpec),
    ManagedCertificate(ManagedCertificateSpec),
    DnsRecord(DnsRecordSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Network(_) => ResourceKind::Network,
            ResourceSpec::Subnet(_) => ResourceKind::Subnet,
            ResourceSpec::Cluster(_) => ResourceKind::Cluster,
            ResourceSpec::NodePool(_) => ResourceKind::NodePool,
            ResourceSpec::ServiceAccount(_) => ResourceKind::ServiceAccount,
            ResourceSpec::IamBinding(_) => ResourceKind::IamBinding,
            ResourceSpec::Bucket(_) => ResourceKind::Bucket,
            ResourceSpec::StaticAddress(_) => ResourceKind::StaticAddress,
            ResourceSpec::Namespace(_) => ResourceKind::Namespace,
            ResourceSpec::K8sServiceAccount(_) => ResourceKind::K8sServiceAccount,
            ResourceSpec::Ingress(_) => ResourceKind::Ingress,
            ResourceSpec::ManagedCertificate(_) => ResourceKind::ManagedCertificate,
            ResourceSpec::DnsRecord(_) => ResourceKind::DnsRecord,
        }
    }

    /// 外部リソース名
    pub fn name(&self) -> &str {
        match self {
            ResourceSpec::Network(s) => &s.name,
            ResourceSpec::Subnet(s) => &s.name,
            ResourceSpec::Cluster(s) => &s.name,
            ResourceSpec::NodePool(s) => &s.name,
            ResourceSpec::ServiceAccount(s) => &s.account_id,
            ResourceSpec::IamBinding(s) => &s.role,
            ResourceSpec::Bucket(s) => &s.name,
            ResourceSpec::StaticAddress(s) => &s.name,
            ResourceSpec::Namespace(s) => &s.name,
            ResourceSpec::K8sServiceAccount(s) => &s.name,
            ResourceSpec::Ingress(s) => &s.name,
            ResourceSpec::ManagedCertificate(s) => &s.name,
            ResourceSpec::DnsRecord(s) => &s.name,
        }
    }
}

/// VPCネットワーク
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    /// auto モードでサブネットを自動作成するか
    #[serde(default)]
    pub auto_subnets: bool,
    /// REGIONAL / GLOBAL
    pub routing_mode: Option<String>,
}

/// サブネット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetSpec {
    pub name: String,
    pub network: String,
    /// 未指定時は project の region
    pub region: Option<String>,
    pub range: String,
    /// セカンダリレンジ名 -> CIDR (Pod / Service 用)
    #[serde(default)]
    pub secondary_ranges: BTreeMap<String, String>,
}

/// GKE クラスタ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    /// 未指定時は project の zone、なければ region
    pub location: Option<String>,
    pub network: Option<String>,
    pub subnetwork: Option<String>,
    pub release_channel: Option<String>,
    #[serde(default)]
    pub workload_identity: bool,
    pub pods_range: Option<String>,
    pub services_range: Option<String>,
}

/// ノードプール
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePoolSpec {
    pub name: String,
    pub cluster: String,
    pub location: Option<String>,
    pub machine_type: String,
    pub min_nodes: u32,
    pub max_nodes: u32,
    pub disk_size_gb: Option<u32>,
    #[serde(default)]
    pub spot: bool,
    pub service_account: Option<String>,
}

/// GCP サービスアカウント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAccountSpec {
    pub account_id: String,
    pub display_name: Option<String>,
}

impl ServiceAccountSpec {
    pub fn email(&self, project: &str) -> String {
        format!("{}@{}.iam.gserviceaccount.com", self.account_id, project)
    }
}

/// IAM ロールバインディング
///
/// `service_account` を指定するとサービスアカウントに対するバインディング
/// (Workload Identity 用)、未指定ならプロジェクトに対するバインディング。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IamBindingSpec {
    pub member: String,
    pub role: String,
    pub service_account: Option<String>,
}

/// Cloud Storage バケット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub name: String,
    pub location: Option<String>,
    pub storage_class: Option<String>,
    #[serde(default)]
    pub uniform_access: bool,
}

/// 静的IPアドレス
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticAddressSpec {
    pub name: String,
    /// Ingress 用のグローバルアドレスか
    #[serde(default)]
    pub global: bool,
    pub region: Option<String>,
}

/// Kubernetes Namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceSpec {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Kubernetes ServiceAccount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct K8sServiceAccountSpec {
    pub name: String,
    pub namespace: String,
    /// Workload Identity で紐付ける GCP サービスアカウントのメールアドレス
    pub gcp_service_account: Option<String>,
}

/// Kubernetes Ingress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngressSpec {
    pub name: String,
    pub namespace: String,
    pub host: Option<String>,
    pub service: String,
    pub port: u16,
    /// "gce" / "nginx" など
    pub ingress_class: Option<String>,
    /// グローバル静的アドレス名
    pub static_address: Option<String>,
    /// ManagedCertificate 名
    pub certificate: Option<String>,
}

/// GKE ManagedCertificate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedCertificateSpec {
    pub name: String,
    pub namespace: String,
    pub domains: Vec<String>,
}

/// DNS レコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecordSpec {
    /// ホストゾーンID
    pub hosted_zone: String,
    pub name: String,
    pub record_type: String,
    pub ttl: u32,
    pub values: Vec<String>,
}
