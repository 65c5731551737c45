use colored::Colorize;
use gantry_cloud::{
    ClientRegistry, CloudError, ExecutorConfig, FileLedgerStore, KindOracle, Plan, PlanAction,
    PollPolicy, ReadinessPolicies, RetryConfig,
};
use gantry_config::Settings;
use gantry_core::{Context, InfraDocument, ResourceKind};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// ロード済みのプロジェクト
pub struct Project {
    pub root: PathBuf,
    pub document: InfraDocument,
    pub settings: Settings,
}

impl Project {
    /// プロジェクトルートを探し、インフラ定義と設定を読み込む
    pub fn discover() -> anyhow::Result<Self> {
        let root = gantry_core::find_project_root()?;
        let document = gantry_core::load_project_from_root(&root)?;
        document.validate()?;
        let settings = Settings::load(Some(&root))?;
        Ok(Self {
            root,
            document,
            settings,
        })
    }

    pub fn context(&self) -> &Context {
        &self.document.context
    }

    pub fn ledger_store(&self) -> FileLedgerStore {
        FileLedgerStore::new(self.settings.ledger_dir(&self.root))
    }

    /// 読み込んだファイル情報を表示
    pub fn print_header(&self) {
        if let Some(path) = gantry_core::find_infra_file(&self.root) {
            println!("📄 インフラ定義: {}", path.display().to_string().cyan());
        }
        println!(
            "プロジェクト: {} ({})",
            self.context().project.cyan(),
            self.context().default_location()
        );
    }
}

/// エラーから終了コードを決める
///
/// 1: レジャーは更新済みで再実行で再開できる
/// 2: 再実行しても解決しない (定義の誤り、循環依存、レジャー破損、ロック中)
pub fn exit_code_for(error: &anyhow::Error) -> u8 {
    if let Some(cloud) = error.downcast_ref::<CloudError>() {
        return match cloud {
            CloudError::Cancelled => 1,
            e if e.is_fatal() => 2,
            _ => 1,
        };
    }
    // 定義・設定エラー、認証失敗
    2
}

/// 設定ファイルの値から Executor の設定を組み立てる
pub fn executor_config(settings: &Settings, concurrency: Option<usize>) -> ExecutorConfig {
    let retry = RetryConfig {
        max_attempts: settings.retry.max_attempts,
        initial_delay: Duration::from_millis(settings.retry.initial_delay_ms),
        max_delay: Duration::from_millis(settings.retry.max_delay_ms),
        backoff_multiplier: settings.retry.multiplier,
    };

    let mut policies = ReadinessPolicies::new();
    for (kind, poll) in &settings.readiness {
        let base = PollPolicy::default_for(*kind);
        policies = policies.with_override(
            *kind,
            PollPolicy {
                interval: poll
                    .interval_secs
                    .map(Duration::from_secs)
                    .unwrap_or(base.interval),
                timeout: poll
                    .timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(base.timeout),
            },
        );
    }

    ExecutorConfig {
        concurrency: concurrency.unwrap_or(settings.concurrency).max(1),
        retry,
        policies,
    }
}

pub fn oracle(settings: &Settings) -> KindOracle {
    KindOracle {
        certificate_not_visible_tolerance: settings.certificate_not_visible_tolerance,
    }
}

/// 対象リソース種別のクライアントで認証を確認
///
/// 同じ CLI を使うクライアントは1回だけ確認します。
pub async fn check_auth(
    registry: &ClientRegistry,
    kinds: impl IntoIterator<Item = ResourceKind>,
    ctx: &Context,
) -> anyhow::Result<()> {
    let mut checked = BTreeSet::new();
    for kind in kinds {
        let client = registry.get(kind)?;
        let tool = client.name().split('-').next().unwrap_or_default().to_string();
        if !checked.insert(tool.clone()) {
            continue;
        }

        let status = client.check_auth(ctx).await?;
        if !status.authenticated {
            anyhow::bail!(
                "{} の認証に失敗しました: {}",
                tool,
                status.error.unwrap_or_default()
            );
        }
        println!(
            "  ✓ {} ({})",
            tool,
            status.account_info.unwrap_or_default().dimmed()
        );
    }
    Ok(())
}

/// Ctrl-C でキャンセルトークンを発火する
pub fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!(
                "{}",
                "中断しています... 実行中のリソースはレジャーに残り、次回の apply で再開されます"
                    .yellow()
            );
            token.cancel();
        }
    })
}

/// 実行計画を表示
pub fn print_plan(plan: &Plan) {
    println!();
    if plan.batches.is_empty() {
        println!("{}", "実行するステップはありません".dimmed());
    }
    for batch in &plan.batches {
        println!("{}", format!("バッチ {}:", batch.index + 1).bold());
        for entry in &batch.entries {
            let marker = match entry.action {
                PlanAction::Create => "+".green(),
                PlanAction::Update => "~".yellow(),
                PlanAction::Resume => "↻".cyan(),
            };
            println!(
                "  {} {} {} ({})",
                marker,
                entry.descriptor.kind().to_string().dimmed(),
                entry.id().cyan(),
                entry.action
            );
        }
    }

    if !plan.unchanged.is_empty() {
        println!("変更なし: {}", plan.unchanged.join(", ").dimmed());
    }
    if !plan.orphaned.is_empty() {
        println!(
            "{} {}",
            "定義から削除済み (レジャーのみ):".yellow(),
            plan.orphaned.join(", ")
        );
        println!(
            "{}",
            "  これらは apply では削除されません。destroy で削除してください".dimmed()
        );
    }
    println!();
    println!("{}", plan.summary().to_string().bold());
}
