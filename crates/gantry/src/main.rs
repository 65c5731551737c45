mod commands;
mod utils;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "依存順に、再開可能に。GKE 環境を infra.kdl から組み上げる", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 実行計画を表示（外部呼び出しなし）
    Plan {
        /// JSON で出力
        #[arg(long)]
        json: bool,
    },
    /// 計画を実行し、すべてのリソースを Ready にする
    Apply {
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
        /// 同一バッチ内の同時実行数（設定ファイルより優先）
        #[arg(short, long, env = "GANTRY_CONCURRENCY")]
        concurrency: Option<usize>,
    },
    /// レジャーに記録されたリソースを依存の逆順に削除
    Destroy {
        /// 確認なしで実行（指定しない場合は削除対象の表示のみ）
        #[arg(short, long)]
        yes: bool,
    },
    /// レジャーの状態を表示
    Status {
        /// JSON で出力
        #[arg(long)]
        json: bool,
    },
    /// インフラ定義と依存グラフを検証
    Validate,
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 進捗は stdout、ログは stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!();
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(utils::exit_code_for(&e))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    // Versionコマンドはプロジェクト不要
    if matches!(cli.command, Commands::Version) {
        println!("gantry {}", env!("CARGO_PKG_VERSION"));
        return Ok(0);
    }

    let project = utils::Project::discover()?;

    match cli.command {
        Commands::Plan { json } => commands::plan::handle(&project, json).await,
        Commands::Apply { yes, concurrency } => {
            commands::apply::handle(&project, yes, concurrency).await
        }
        Commands::Destroy { yes } => commands::destroy::handle(&project, yes).await,
        Commands::Status { json } => commands::status::handle(&project, json).await,
        Commands::Validate => commands::validate::handle(&project),
        Commands::Version => unreachable!("Version is handled before project loading"),
    }
}
