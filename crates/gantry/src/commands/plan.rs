use crate::utils::{self, Project};
use gantry_cloud::Ledger;

/// 実行計画を表示する
///
/// レジャーを読むだけで、ロックも外部呼び出しも行いません。
pub async fn handle(project: &Project, json: bool) -> anyhow::Result<u8> {
    let ledger = Ledger::open(project.ledger_store()).await?;
    let prior = ledger.snapshot().await;
    let plan = gantry_cloud::plan(&project.document.descriptors, &prior)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(0);
    }

    project.print_header();
    utils::print_plan(&plan);
    Ok(0)
}
