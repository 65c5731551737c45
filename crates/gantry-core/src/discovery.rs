//! プロジェクトルートとインフラ定義ファイルの発見

use crate::error::{FlowError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// インフラ定義ファイルの候補 (優先順)
pub const INFRA_FILE_CANDIDATES: [&str; 4] = [
    "infra.local.kdl",
    "infra.kdl",
    ".gantry/infra.local.kdl",
    ".gantry/infra.kdl",
];

/// プロジェクトルートを検出
///
/// 以下の優先順位で検索:
/// 1. 環境変数 GANTRY_PROJECT_ROOT
/// 2. カレントディレクトリから上に向かって infra.kdl / .gantry/infra.kdl を探す
#[tracing::instrument]
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var("GANTRY_PROJECT_ROOT") {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking GANTRY_PROJECT_ROOT");
        if find_infra_file(&path).is_some() {
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
    }

    let start_dir = std::env::current_dir()?;
    find_project_root_from(&start_dir)
}

/// 指定ディレクトリから上に向かってプロジェクトルートを探す
pub fn find_project_root_from(start_dir: &Path) -> Result<PathBuf> {
    let mut current = start_dir.to_path_buf();

    loop {
        if find_infra_file(&current).is_some() {
            info!(project_root = %current.display(), "Found project root");
            return Ok(current);
        }

        if !current.pop() {
            break;
        }
    }

    warn!(start_dir = %start_dir.display(), "Project root not found");
    Err(FlowError::ProjectRootNotFound(start_dir.to_path_buf()))
}

/// プロジェクトルート内のインフラ定義ファイル
///
/// infra.local.kdl が infra.kdl より優先されます。
pub fn find_infra_file(project_root: &Path) -> Option<PathBuf> {
    INFRA_FILE_CANDIDATES
        .iter()
        .map(|candidate| project_root.join(candidate))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_find_infra_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("infra.kdl"), "// shared").unwrap();
        fs::write(temp_dir.path().join("infra.local.kdl"), "// local").unwrap();

        let found = find_infra_file(temp_dir.path()).unwrap();
        assert!(found.ends_with("infra.local.kdl"));
    }

    #[test]
    fn test_find_infra_file_in_gantry_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir(temp_dir.path().join(".gantry")).unwrap();
        fs::write(temp_dir.path().join(".gantry/infra.kdl"), "// hidden").unwrap();

        let found = find_infra_file(temp_dir.path()).unwrap();
        assert!(found.ends_with(".gantry/infra.kdl"));
    }

    #[test]
    fn test_find_project_root_walks_up() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("infra.kdl"), "// root").unwrap();
        let nested = temp_dir.path().join("envs/prod");
        fs::create_dir_all(&nested).unwrap();

        let root = find_project_root_from(&nested).unwrap();
        assert_eq!(root, temp_dir.path());
    }

    #[test]
    fn test_find_project_root_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = find_project_root_from(temp_dir.path());
        // tmp の上位に infra.kdl がない前提
        if let Err(FlowError::ProjectRootNotFound(path)) = result {
            assert_eq!(path, temp_dir.path());
        } else {
            panic!("Expected ProjectRootNotFound error");
        }
    }

    #[test]
    #[serial]
    fn test_find_project_root_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("infra.kdl"), "// env").unwrap();

        // SAFETY: serial テスト内でのみ環境変数を変更する
        unsafe {
            std::env::set_var("GANTRY_PROJECT_ROOT", temp_dir.path());
        }

        let root = find_project_root().unwrap();
        assert_eq!(root, temp_dir.path());

        unsafe {
            std::env::remove_var("GANTRY_PROJECT_ROOT");
        }
    }
}
