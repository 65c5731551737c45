#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

mod common;

use assert_cmd::Command;
use common::TestProject;
use predicates::prelude::*;

const CHAIN: &str = r#"
network "vpc" {}
subnet "subnet" {
    depends-on "vpc"
    network "vpc"
    range "10.0.0.0/20"
}
namespace "app" {}
"#;

fn gantry(project: &TestProject) -> Command {
    let mut cmd = Command::cargo_bin("gantry").unwrap();
    cmd.current_dir(project.path())
        .env_remove("GANTRY_PROJECT_ROOT")
        .env_remove("GANTRY_CONFIG_PATH")
        .env("XDG_CONFIG_HOME", project.path())
        .env("NO_COLOR", "1");
    cmd
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("gantry").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("apply"))
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("status"));
}

/// バージョン表示が正しく動作することを確認
#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("gantry").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("gantry"));
}

/// applyコマンドのヘルプにオプションが表示されることを確認
#[test]
fn test_apply_help() {
    let mut cmd = Command::cargo_bin("gantry").unwrap();
    cmd.arg("apply")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"))
        .stdout(predicate::str::contains("--concurrency"));
}

/// 不正なコマンドでエラーになることを確認
#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("gantry").unwrap();
    cmd.arg("invalid-command").assert().failure();
}

/// プロジェクト外で validate を実行すると終了コード2
#[test]
fn test_validate_without_project() {
    let empty = TestProject::new();
    gantry(&empty).arg("validate").assert().code(2);
}

/// 正常な定義は validate を通過する
#[test]
fn test_validate_success() {
    let project = TestProject::new();
    project.write_infra_kdl(CHAIN);

    gantry(&project)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("acme-test"))
        .stdout(predicate::str::contains("バッチ: 2段"));
}

/// 循環依存は終了コード2で拒否される
#[test]
fn test_cycle_is_fatal() {
    let project = TestProject::new();
    project.write_infra_kdl(
        r#"
        network "a" {
            depends-on "b"
        }
        network "b" {
            depends-on "a"
        }
        "#,
    );

    gantry(&project)
        .arg("plan")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Dependency cycle detected among: a, b"));
}

/// 未定義の依存先は終了コード2
#[test]
fn test_unknown_dependency_is_fatal() {
    let project = TestProject::new();
    project.write_infra_kdl(
        r#"
        subnet "subnet" {
            depends-on "vpc"
            network "vpc"
            range "10.0.0.0/20"
        }
        "#,
    );

    gantry(&project).arg("validate").assert().code(2);
}

/// plan はバッチ順に作成予定を表示し、レジャーを作らない
#[test]
fn test_plan_prints_batches() {
    let project = TestProject::new();
    project.write_infra_kdl(CHAIN);

    gantry(&project)
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("バッチ 1:"))
        .stdout(predicate::str::contains("バッチ 2:"))
        .stdout(predicate::str::contains("3 to create"));

    assert!(!project.ledger_path().exists());
}

/// plan --json はバッチを JSON で出力する
#[test]
fn test_plan_json() {
    let project = TestProject::new();
    project.write_infra_kdl(CHAIN);

    let output = gantry(&project)
        .arg("plan")
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let batches = plan["batches"].as_array().unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1]["entries"][0]["descriptor"]["id"], "subnet");
    assert_eq!(batches[1]["entries"][0]["action"], "create");
}

/// --yes なしの apply は計画を表示するだけで何も実行しない
#[test]
fn test_apply_without_yes_is_dry() {
    let project = TestProject::new();
    project.write_infra_kdl(CHAIN);

    gantry(&project)
        .arg("apply")
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"));

    assert!(!project.ledger_path().exists());
    assert!(!project.exists(".gantry/lock.json"));
}

/// レジャーが空なら destroy は何もしない
#[test]
fn test_destroy_with_empty_ledger() {
    let project = TestProject::new();
    project.write_infra_kdl(CHAIN);

    gantry(&project)
        .arg("destroy")
        .arg("--yes")
        .assert()
        .success()
        .stdout(predicate::str::contains("レジャーにリソースがありません"));
}

/// ロックが保持されている間の apply は終了コード2
#[test]
fn test_apply_while_locked_is_fatal() {
    let project = TestProject::new();
    project.write_infra_kdl(CHAIN);
    let acquired_at = chrono::Utc::now().to_rfc3339();
    project.write_raw(
        ".gantry/lock.json",
        &format!(
            r#"{{"holder": "ci-runner", "pid": 4242, "acquired_at": "{}"}}"#,
            acquired_at
        ),
    );

    gantry(&project)
        .arg("apply")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("ci-runner"));
}

/// 壊れたレジャーは終了コード2
#[test]
fn test_corrupt_ledger_is_fatal() {
    let project = TestProject::new();
    project.write_infra_kdl(CHAIN);
    project.write_raw(".gantry/ledger.json", "{ not json");

    gantry(&project).arg("status").assert().code(2);
}

/// status は空のレジャーと未適用のリソースを表示する
#[test]
fn test_status_lists_undeployed() {
    let project = TestProject::new();
    project.write_infra_kdl(CHAIN);

    gantry(&project)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("レコードはありません"));
}
