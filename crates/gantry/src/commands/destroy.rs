use crate::utils::{self, Project};
use colored::Colorize;
use gantry_cloud::{ClientRegistry, Executor, Ledger, TeardownCoordinator};
use std::collections::BTreeSet;
use std::sync::Arc;

pub async fn handle(project: &Project, yes: bool) -> anyhow::Result<u8> {
    project.print_header();

    let store = project.ledger_store();
    let lock = store.acquire_lock().await?;
    let ledger = Arc::new(Ledger::open(store).await?);

    let records = ledger.snapshot().await;
    if records.is_empty() {
        println!("{}", "レジャーにリソースがありません".dimmed());
        lock.release().await?;
        return Ok(0);
    }

    println!();
    println!(
        "{}",
        format!("削除対象 ({} 個):", records.len()).bold()
    );
    for record in records.iter().rev() {
        println!(
            "  - {} {} {}",
            record.kind.to_string().dimmed(),
            record.id.cyan(),
            record.external_identity.dimmed()
        );
    }

    // 確認プロンプト
    if !yes {
        println!();
        println!("{}", "⚠ 警告: 上記のリソースを完全に削除します".red().bold());
        println!("  データは復旧できません。実行するには --yes を指定してください。");
        lock.release().await?;
        return Ok(0);
    }

    let mut registry = ClientRegistry::new();
    gantry_cloud_gcp::register_all(&mut registry);

    println!();
    println!("{}", "認証を確認中...".blue());
    let kinds: BTreeSet<_> = records.iter().map(|r| r.kind).collect();
    utils::check_auth(&registry, kinds, project.context()).await?;

    let executor = Executor::new(project.context().clone(), registry, ledger)
        .with_config(utils::executor_config(&project.settings, None));
    let signal = utils::cancel_on_ctrl_c(executor.cancellation_token());

    println!();
    println!("{}", "削除中...".yellow());
    let result = TeardownCoordinator::new(&executor).teardown().await;
    signal.abort();
    lock.release().await?;
    let report = result?;

    println!();
    for id in &report.destroyed {
        println!("  {} {}", "✓".green(), id.cyan());
    }
    for failure in &report.failed {
        println!("  {} {}: {}", "✗".red(), failure.id.cyan(), failure.error);
    }
    if !report.remaining.is_empty() {
        println!(
            "  {} 残存: {}",
            "⊘".yellow(),
            report.remaining.join(", ")
        );
    }

    println!();
    if report.is_success() {
        println!("{}", format!("✓ 削除完了: {}", report).green().bold());
    } else {
        if report.cancelled {
            println!("{}", "中断されました".yellow());
        }
        println!("{}", format!("⚠ 一部未完了: {}", report).yellow().bold());
        println!(
            "{}",
            "  再度 destroy を実行すると残りのリソースを削除します".dimmed()
        );
    }

    Ok(report.exit_code() as u8)
}
