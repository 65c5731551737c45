//! リソース記述子とインフラ定義ドキュメント

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::kind::ResourceKind;
use super::spec::ResourceSpec;
use crate::error::{FlowError, Result};

/// 実行コンテキスト
///
/// プロジェクト・リージョンなど、すべてのクライアント呼び出しに明示的に渡される値。
/// 環境変数や kubectl のカレントコンテキストには依存しません。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// GCP プロジェクトID
    pub project: String,
    pub region: String,
    pub zone: Option<String>,
    /// kubectl の --context に渡す名前
    pub kube_context: Option<String>,
}

impl Context {
    pub fn new(project: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            region: region.into(),
            ..Default::default()
        }
    }

    /// クラスタのロケーション (zone 優先)
    pub fn default_location(&self) -> &str {
        self.zone.as_deref().unwrap_or(&self.region)
    }
}

/// 宣言されたインフラリソース1件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// プラン内で一意なID
    pub id: String,
    pub spec: ResourceSpec,
    /// プロビジョニング開始前に Ready になっている必要があるリソースのID
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
}

impl ResourceDescriptor {
    pub fn new(id: impl Into<String>, spec: ResourceSpec) -> Self {
        Self {
            id: id.into(),
            spec,
            depends_on: BTreeSet::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    /// 外部リソースの識別子
    ///
    /// spec とコンテキストだけから導出されるため、再起動後も同じ値になります。
    pub fn external_identity(&self, ctx: &Context) -> String {
        let project = &ctx.project;
        match &self.spec {
            ResourceSpec::Network(s) => format!("projects/{project}/global/networks/{}", s.name),
            ResourceSpec::Subnet(s) => format!(
                "projects/{project}/regions/{}/subnetworks/{}",
                s.region.as_deref().unwrap_or(&ctx.region),
                s.name
            ),
            ResourceSpec::Cluster(s) => format!(
                "projects/{project}/locations/{}/clusters/{}",
                s.location.as_deref().unwrap_or(ctx.default_location()),
                s.name
            ),
            ResourceSpec::NodePool(s) => format!(
                "projects/{project}/locations/{}/clusters/{}/nodePools/{}",
                s.location.as_deref().unwrap_or(ctx.default_location()),
                s.cluster,
                s.name
            ),
            ResourceSpec::ServiceAccount(s) => {
                format!("projects/{project}/serviceAccounts/{}", s.email(project))
            }
            ResourceSpec::IamBinding(s) => match &s.service_account {
                Some(sa) => format!("projects/{project}/serviceAccounts/{sa}#{}#{}", s.role, s.member),
                None => format!("projects/{project}#{}#{}", s.role, s.member),
            },
            ResourceSpec::Bucket(s) => format!("gs://{}", s.name),
            ResourceSpec::StaticAddress(s) => {
                if s.global {
                    format!("projects/{project}/global/addresses/{}", s.name)
                } else {
                    format!(
                        "projects/{project}/regions/{}/addresses/{}",
                        s.region.as_deref().unwrap_or(&ctx.region),
                        s.name
                    )
                }
            }
            ResourceSpec::Namespace(s) => format!("namespace/{}", s.name),
            ResourceSpec::K8sServiceAccount(s) => {
                format!("{}/serviceaccount/{}", s.namespace, s.name)
            }
            ResourceSpec::Ingress(s) => format!("{}/ingress/{}", s.namespace, s.name),
            ResourceSpec::ManagedCertificate(s) => {
                format!("{}/managedcertificate/{}", s.namespace, s.name)
            }
            ResourceSpec::DnsRecord(s) => {
                format!("hostedzone/{}/{}/{}", s.hosted_zone, s.record_type, s.name)
            }
        }
    }
}

/// infra.kdl をパースした結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfraDocument {
    pub context: Context,
    pub descriptors: Vec<ResourceDescriptor>,
}

impl InfraDocument {
    pub fn get(&self, id: &str) -> Option<&ResourceDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    /// ID の重複と未定義リソースへの依存を検出
    ///
    /// 循環依存はプランナーが検出します。
    pub fn validate(&self) -> Result<()> {
        let mut ids = BTreeSet::new();
        for descriptor in &self.descriptors {
            if !ids.insert(descriptor.id.as_str()) {
                return Err(FlowError::DuplicateId(descriptor.id.clone()));
            }
        }

        for descriptor in &self.descriptors {
            if let Some(missing) = descriptor
                .depends_on
                .iter()
                .find(|dep| !ids.contains(dep.as_str()))
            {
                return Err(FlowError::UnknownDependency {
                    id: descriptor.id.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        Ok(())
    }
}
