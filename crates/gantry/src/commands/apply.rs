use crate::utils::{self, Project};
use colored::Colorize;
use gantry_cloud::{ClientRegistry, Executor, Ledger};
use std::collections::BTreeSet;
use std::sync::Arc;

pub async fn handle(project: &Project, yes: bool, concurrency: Option<usize>) -> anyhow::Result<u8> {
    project.print_header();

    let store = project.ledger_store();
    let lock = store.acquire_lock().await?;
    let ledger = Arc::new(Ledger::open(store).await?);
    println!("レジャー: {}", ledger.location().dimmed());

    let prior = ledger.snapshot().await;
    let plan = gantry_cloud::plan(&project.document.descriptors, &prior)?;
    utils::print_plan(&plan);

    if !plan.has_changes() {
        println!();
        println!("{}", "✓ すべてのリソースは最新です".green().bold());
        lock.release().await?;
        return Ok(0);
    }

    // 確認（--yesが指定されていない場合）
    if !yes {
        println!();
        println!("実行するには --yes オプションを指定してください");
        lock.release().await?;
        return Ok(0);
    }

    let mut registry = ClientRegistry::new();
    gantry_cloud_gcp::register_all(&mut registry);

    println!();
    println!("{}", "認証を確認中...".blue());
    let kinds: BTreeSet<_> = plan.entries().map(|e| e.descriptor.kind()).collect();
    utils::check_auth(&registry, kinds, project.context()).await?;

    let executor = Executor::new(project.context().clone(), registry, ledger)
        .with_config(utils::executor_config(&project.settings, concurrency))
        .with_oracle(Arc::new(utils::oracle(&project.settings)));
    let signal = utils::cancel_on_ctrl_c(executor.cancellation_token());

    println!();
    println!("{}", "適用中...".blue());
    let result = executor.apply(&plan).await;
    signal.abort();
    lock.release().await?;
    let report = result?;

    println!();
    for id in &report.ready {
        println!("  {} {}", "✓".green(), id.cyan());
    }
    for failure in &report.failed {
        println!("  {} {}: {}", "✗".red(), failure.id.cyan(), failure.error);
    }
    for id in &report.blocked {
        println!("  {} {} (依存先が失敗)", "⊘".yellow(), id.cyan());
    }
    for id in &report.cancelled {
        println!("  {} {} (中断)", "…".yellow(), id.cyan());
    }

    println!();
    if report.is_success() {
        println!("{}", format!("✓ 適用完了: {}", report).green().bold());
    } else {
        println!("{}", format!("⚠ 一部未完了: {}", report).yellow().bold());
        println!(
            "{}",
            "  原因を解消して再度 apply すると、未完了のリソースから再開します".dimmed()
        );
    }

    Ok(report.exit_code() as u8)
}
