pub mod error;

pub use error::*;

use gantry_core::ResourceKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// gantry のユーザー設定ディレクトリ (~/.config/gantry)
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("gantry"))
}

/// 設定ファイル (config.yaml) を探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 GANTRY_CONFIG_PATH (直接パス指定)
/// 2. <project>/.gantry/config.yaml
/// 3. ~/.config/gantry/config.yaml
pub fn find_settings_file(project_root: Option<&Path>) -> Option<PathBuf> {
    if let Ok(config_path) = std::env::var("GANTRY_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Some(path);
        }
    }

    if let Some(root) = project_root {
        let path = root.join(".gantry").join("config.yaml");
        if path.exists() {
            return Some(path);
        }
    }

    let global = get_config_dir().ok()?.join("config.yaml");
    global.exists().then_some(global)
}

/// 実行設定
///
/// ファイルがない場合はすべてデフォルト値。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// 同一バッチ内の同時実行数
    pub concurrency: usize,
    pub retry: RetrySettings,
    /// 種別ごとのポーリング間隔・タイムアウトの上書き
    pub readiness: BTreeMap<ResourceKind, PollOverride>,
    /// 証明書が FailedNotVisible のまま何回連続したら失敗とみなすか
    pub certificate_not_visible_tolerance: u32,
    /// レジャー (状態ファイル) を置くディレクトリ。相対パスはプロジェクトルート基準
    pub ledger_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry: RetrySettings::default(),
            readiness: BTreeMap::new(),
            certificate_not_visible_tolerance: 10,
            ledger_dir: PathBuf::from(".gantry"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollOverride {
    pub interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

impl Settings {
    /// YAML文字列から読み込み
    pub fn from_yaml_str(content: &str, path: &Path) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// 設定ファイルを探して読み込む。見つからなければデフォルト値
    pub fn load(project_root: Option<&Path>) -> Result<Self> {
        match find_settings_file(project_root) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading settings");
                let content = std::fs::read_to_string(&path)?;
                Self::from_yaml_str(&content, &path)
            }
            None => {
                tracing::debug!("Settings file not found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// レジャーディレクトリの絶対パス
    pub fn ledger_dir(&self, project_root: &Path) -> PathBuf {
        if self.ledger_dir.is_absolute() {
            self.ledger_dir.clone()
        } else {
            project_root.join(&self.ledger_dir)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "concurrency は1以上にしてください".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "retry.max_attempts は1以上にしてください".to_string(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue(
                "retry.multiplier は1.0以上にしてください".to_string(),
            ));
        }
        for (kind, poll) in &self.readiness {
            if poll.interval_secs == Some(0) {
                return Err(ConfigError::InvalidValue(format!(
                    "readiness.{}.interval_secs は1以上にしてください",
                    kind
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_defaults_when_empty() {
        let settings = Settings::from_yaml_str("", Path::new("config.yaml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.retry.max_attempts, 5);
    }

    #[test]
    fn test_parse_partial_settings() {
        let yaml = r#"
concurrency: 2
retry:
  max_attempts: 3
readiness:
  managed-certificate:
    interval_secs: 60
    timeout_secs: 7200
  namespace:
    timeout_secs: 30
"#;
        let settings = Settings::from_yaml_str(yaml, Path::new("config.yaml")).unwrap();
        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.retry.max_attempts, 3);
        // 指定されていない値はデフォルトのまま
        assert_eq!(settings.retry.initial_delay_ms, 1000);

        let cert = &settings.readiness[&ResourceKind::ManagedCertificate];
        assert_eq!(cert.interval_secs, Some(60));
        assert_eq!(cert.timeout_secs, Some(7200));
        assert_eq!(
            settings.readiness[&ResourceKind::Namespace].interval_secs,
            None
        );
    }

    #[test]
    fn test_unknown_key_is_error() {
        let result = Settings::from_yaml_str("concurency: 2", Path::new("config.yaml"));
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn test_zero_concurrency_is_error() {
        let result = Settings::from_yaml_str("concurrency: 0", Path::new("config.yaml"));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_ledger_dir_relative_to_project_root() {
        let settings = Settings::default();
        let dir = settings.ledger_dir(Path::new("/srv/infra"));
        assert_eq!(dir, PathBuf::from("/srv/infra/.gantry"));
    }

    #[test]
    #[serial]
    fn test_load_from_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir(temp_dir.path().join(".gantry")).unwrap();
        fs::write(
            temp_dir.path().join(".gantry/config.yaml"),
            "concurrency: 8\n",
        )
        .unwrap();

        temp_env::with_var_unset("GANTRY_CONFIG_PATH", || {
            let settings = Settings::load(Some(temp_dir.path())).unwrap();
            assert_eq!(settings.concurrency, 8);
        });
    }

    #[test]
    #[serial]
    fn test_env_var_takes_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir(temp_dir.path().join(".gantry")).unwrap();
        fs::write(
            temp_dir.path().join(".gantry/config.yaml"),
            "concurrency: 8\n",
        )
        .unwrap();
        let custom = temp_dir.path().join("custom.yaml");
        fs::write(&custom, "concurrency: 1\n").unwrap();

        temp_env::with_var("GANTRY_CONFIG_PATH", Some(custom.as_os_str()), || {
            let found = find_settings_file(Some(temp_dir.path())).unwrap();
            assert_eq!(found, custom);
            let settings = Settings::load(Some(temp_dir.path())).unwrap();
            assert_eq!(settings.concurrency, 1);
        });
    }
}
