//! KDLパーサー
//!
//! infra.kdl をパースして `InfraDocument` を生成します。
//! トップレベルの `project` ノードが実行コンテキスト、それ以外のノードがリソース記述子です。

mod body;
mod resource;

pub use resource::{parse_project, parse_resource};

use crate::error::{FlowError, Result};
use crate::model::{Context, InfraDocument, ResourceKind};
use kdl::KdlDocument;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// KDLファイルをパースしてInfraDocumentを生成
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<InfraDocument> {
    let content = fs::read_to_string(path.as_ref())?;
    tracing::debug!(path = %path.as_ref().display(), "Parsing infra document");
    parse_kdl_string(&content)
}

/// KDL文字列をパース
pub fn parse_kdl_string(content: &str) -> Result<InfraDocument> {
    let doc: KdlDocument = content.parse()?;

    let mut context: Option<Context> = None;
    let mut descriptors = Vec::new();
    let mut seen = BTreeSet::new();

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                if context.is_some() {
                    return Err(FlowError::InvalidConfig(
                        "project ノードは1つだけ指定してください".to_string(),
                    ));
                }
                context = Some(parse_project(node)?);
            }
            other => {
                let kind: ResourceKind = other.parse()?;
                let descriptor = parse_resource(kind, node)?;
                if !seen.insert(descriptor.id.clone()) {
                    return Err(FlowError::DuplicateId(descriptor.id));
                }
                descriptors.push(descriptor);
            }
        }
    }

    let document = InfraDocument {
        context: context.ok_or(FlowError::MissingProject)?,
        descriptors,
    };
    document.validate()?;

    tracing::debug!(
        resources = document.descriptors.len(),
        project = %document.context.project,
        "Parsed infra document"
    );
    Ok(document)
}

#[cfg(test)]
mod tests;
