use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("不明なリソース種別: {0}")]
    UnknownKind(String),

    #[error("リソースIDが重複しています: {0}")]
    DuplicateId(String),

    #[error("{kind} '{id}' に必須フィールド '{field}' がありません")]
    MissingField {
        kind: String,
        id: String,
        field: String,
    },

    #[error("{kind} '{id}' に不明なフィールド '{field}' があります")]
    UnknownField {
        kind: String,
        id: String,
        field: String,
    },

    #[error("{kind} '{id}' のフィールド '{field}' が不正です: {message}")]
    InvalidValue {
        kind: String,
        id: String,
        field: String,
        message: String,
    },

    #[error("'{id}' が未定義のリソース '{dependency}' に依存しています")]
    UnknownDependency { id: String, dependency: String },

    #[error("project ノードがありません (例: project \"my-project\" {{ region \"asia-northeast1\" }})")]
    MissingProject,

    #[error(
        "プロジェクトルートが見つかりません\n探索開始位置: {0}\nヒント: infra.kdl ファイルを含むディレクトリで実行してください"
    )]
    ProjectRootNotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, FlowError>;
