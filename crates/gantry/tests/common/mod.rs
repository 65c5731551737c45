use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const PROJECT: &str = r#"
project "acme-test" {
    region "asia-northeast1"
}
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    /// project ノードに続けてリソース定義を書き込む
    pub fn write_infra_kdl(&self, resources: &str) {
        let path = self.root.path().join("infra.kdl");
        fs::write(path, format!("{}\n{}", PROJECT, resources)).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_raw(&self, relative: &str, content: &str) {
        let path = self.root.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    #[allow(dead_code)]
    pub fn ledger_path(&self) -> PathBuf {
        self.root.path().join(".gantry").join("ledger.json")
    }

    #[allow(dead_code)]
    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.root.path().join(relative).exists()
    }
}
