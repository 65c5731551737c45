use crate::utils::Project;
use colored::Colorize;
use std::collections::BTreeMap;

/// インフラ定義と依存グラフを検証
///
/// 読み込み時点でパースと ID / 依存先の検証は済んでいるので、ここでは
/// 循環依存をプランナーで確認します。
pub fn handle(project: &Project) -> anyhow::Result<u8> {
    println!("{}", "設定を検証中...".blue());
    project.print_header();

    let plan = gantry_cloud::plan(&project.document.descriptors, &[])?;

    println!("{}", "✓ インフラ定義は正常です！".green().bold());
    println!();
    println!("サマリー:");

    let mut by_kind: BTreeMap<_, Vec<&str>> = BTreeMap::new();
    for descriptor in &project.document.descriptors {
        by_kind
            .entry(descriptor.kind())
            .or_default()
            .push(descriptor.id.as_str());
    }
    println!("  リソース: {}個", project.document.descriptors.len());
    for (kind, ids) in &by_kind {
        println!("    - {} ({})", kind.to_string().cyan(), ids.join(", "));
    }
    println!("  バッチ: {}段", plan.batches.len());

    Ok(0)
}
