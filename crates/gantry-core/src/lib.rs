//! gantry core
//!
//! インフラ定義 (infra.kdl) のリソース記述子モデルとパーサー。
//!
//! ```kdl
//! project "acme-prod" {
//!     region "asia-northeast1"
//! }
//!
//! network "vpc" {}
//! subnet "subnet" {
//!     depends-on "vpc"
//!     network "vpc"
//!     range "10.0.0.0/20"
//! }
//! ```

pub mod discovery;
pub mod error;
pub mod model;
pub mod parser;

pub use discovery::{find_infra_file, find_project_root, find_project_root_from};
pub use error::{FlowError, Result};
pub use model::*;
pub use parser::{parse_kdl_file, parse_kdl_string};

use std::path::Path;

/// プロジェクトルートからインフラ定義をロード
pub fn load_project_from_root(project_root: &Path) -> Result<InfraDocument> {
    let path = find_infra_file(project_root)
        .ok_or_else(|| FlowError::ProjectRootNotFound(project_root.to_path_buf()))?;
    tracing::info!(path = %path.display(), "Loading infra document");
    parse_kdl_file(path)
}
