use crate::utils::Project;
use colored::Colorize;
use gantry_cloud::{ExecutionState, Ledger};

/// レジャーの内容を表示
pub async fn handle(project: &Project, json: bool) -> anyhow::Result<u8> {
    let ledger = Ledger::open(project.ledger_store()).await?;
    let records = ledger.snapshot().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(0);
    }

    println!("レジャー: {}", ledger.location().dimmed());
    if records.is_empty() {
        println!("{}", "レコードはありません".dimmed());
        return Ok(0);
    }

    println!();
    for record in &records {
        let state = match record.state {
            ExecutionState::Ready | ExecutionState::Destroyed => record.state.to_string().green(),
            ExecutionState::Failed => record.state.to_string().red(),
            ExecutionState::Blocked => record.state.to_string().yellow(),
            _ => record.state.to_string().cyan(),
        };
        println!(
            "  {:<28} {:<20} {:<12} {}",
            record.id,
            record.kind.to_string(),
            state,
            record.last_updated.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(error) = &record.error {
            println!("      {}", error.red());
        }
    }

    let declared: Vec<&str> = project
        .document
        .descriptors
        .iter()
        .map(|d| d.id.as_str())
        .collect();
    let undeployed: Vec<&str> = declared
        .iter()
        .copied()
        .filter(|id| !records.iter().any(|r| r.id == *id))
        .collect();
    if !undeployed.is_empty() {
        println!();
        println!("未適用: {}", undeployed.join(", ").dimmed());
    }

    Ok(0)
}
