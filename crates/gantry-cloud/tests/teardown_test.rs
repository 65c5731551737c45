mod common;

use common::*;
use gantry_cloud::{CloudError, ExecutionState, MemoryLedgerStore, TeardownCoordinator, plan};

async fn provisioned(
    client: &std::sync::Arc<FakeClient>,
    store: &MemoryLedgerStore,
    descriptors: &[gantry_core::ResourceDescriptor],
) -> gantry_cloud::Executor {
    let ledger = open_ledger(store).await;
    let executor = executor(client, ledger);
    let report = executor
        .apply(&plan(descriptors, &[]).unwrap())
        .await
        .unwrap();
    assert!(report.is_success());
    executor
}

/// 依存する側が Destroyed になってから依存先の削除が始まる
#[tokio::test(start_paused = true)]
async fn test_teardown_runs_in_reverse_order() {
    let client = FakeClient::new();
    let store = MemoryLedgerStore::new();
    let descriptors = vec![
        network("network", &[]),
        network("subnet", &["network"]),
        network("cluster", &["subnet"]),
    ];
    let executor = provisioned(&client, &store, &descriptors).await;

    let report = TeardownCoordinator::new(&executor)
        .teardown()
        .await
        .unwrap();

    assert_eq!(report.destroyed, vec!["cluster", "subnet", "network"]);
    assert!(report.is_success());
    assert_eq!(client.order_of("delete"), vec!["cluster", "subnet", "network"]);

    // cluster の不在確認 (最後の status) が subnet の delete より前
    let cluster_gone = client.calls_of("status", "cluster").last().unwrap().at;
    let subnet_delete = client.calls_of("delete", "subnet")[0].at;
    assert!(cluster_gone <= subnet_delete);

    assert!(executor.ledger().is_empty().await);
    assert!(store.document().unwrap().records.is_empty());
}

/// すでに存在しないリソースの削除は成功扱い
#[tokio::test(start_paused = true)]
async fn test_absent_resource_counts_as_destroyed() {
    let client = FakeClient::new();
    let store = MemoryLedgerStore::new();
    let executor = provisioned(&client, &store, &[network("network", &[])]).await;

    client.forget("network");
    let report = TeardownCoordinator::new(&executor)
        .teardown()
        .await
        .unwrap();

    assert_eq!(report.destroyed, vec!["network"]);
    assert!(report.failed.is_empty());
    assert!(executor.ledger().is_empty().await);
}

/// 削除失敗はその枝だけを止め、独立した枝は続行
#[tokio::test(start_paused = true)]
async fn test_failed_delete_halts_only_its_branch() {
    let client = FakeClient::new();
    let store = MemoryLedgerStore::new();
    let descriptors = vec![
        network("network", &[]),
        network("subnet", &["network"]),
        network("bucket", &[]),
    ];
    let executor = provisioned(&client, &store, &descriptors).await;

    client.fail_delete(
        "subnet",
        vec![CloudError::Permanent("permission denied".into())],
    );
    let report = TeardownCoordinator::new(&executor)
        .teardown()
        .await
        .unwrap();

    assert_eq!(report.destroyed, vec!["bucket"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].id, "subnet");
    assert_eq!(report.remaining, vec!["network"]);
    assert_eq!(report.exit_code(), 1);

    // network には触れていない
    assert!(client.calls_of("delete", "network").is_empty());
    assert!(client.exists("network"));
    assert_eq!(
        executor.ledger().state("subnet").await,
        Some(ExecutionState::Failed)
    );
    assert_eq!(
        executor.ledger().state("network").await,
        Some(ExecutionState::Ready)
    );
}

/// 失敗後の再 teardown で残りを片付けられる
#[tokio::test(start_paused = true)]
async fn test_teardown_can_be_retried() {
    let client = FakeClient::new();
    let store = MemoryLedgerStore::new();
    let descriptors = vec![network("network", &[]), network("subnet", &["network"])];
    let executor = provisioned(&client, &store, &descriptors).await;

    client.fail_delete(
        "subnet",
        vec![CloudError::Permanent("permission denied".into())],
    );
    let first = TeardownCoordinator::new(&executor)
        .teardown()
        .await
        .unwrap();
    assert!(!first.is_success());

    let second = TeardownCoordinator::new(&executor)
        .teardown()
        .await
        .unwrap();
    assert!(second.is_success());
    assert_eq!(second.destroyed, vec!["subnet", "network"]);
}

/// 一時的な削除エラーはリトライされる
#[tokio::test(start_paused = true)]
async fn test_transient_delete_is_retried() {
    let client = FakeClient::new();
    let store = MemoryLedgerStore::new();
    let executor = provisioned(&client, &store, &[network("network", &[])]).await;

    client.fail_delete("network", vec![CloudError::Transient("503".into())]);
    let report = TeardownCoordinator::new(&executor)
        .teardown()
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(client.calls_of("delete", "network").len(), 2);
}

/// 作成に失敗しブロックされたレコードも片付く
#[tokio::test(start_paused = true)]
async fn test_failed_and_blocked_records_are_cleared() {
    let client = FakeClient::new();
    let store = MemoryLedgerStore::new();
    let ledger = open_ledger(&store).await;
    let executor = executor(&client, ledger.clone());

    client.fail_create(
        "network",
        vec![CloudError::Permanent("quota exceeded".into())],
    );
    let descriptors = vec![network("network", &[]), network("subnet", &["network"])];
    executor
        .apply(&plan(&descriptors, &[]).unwrap())
        .await
        .unwrap();

    let report = TeardownCoordinator::new(&executor)
        .teardown()
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.destroyed, vec!["subnet", "network"]);
    assert!(ledger.is_empty().await);
}

/// キャンセル済みなら何も削除しない
#[tokio::test(start_paused = true)]
async fn test_cancelled_teardown_leaves_ledger() {
    let client = FakeClient::new();
    let store = MemoryLedgerStore::new();
    let executor = provisioned(&client, &store, &[network("network", &[])]).await;

    executor.cancellation_token().cancel();
    let report = TeardownCoordinator::new(&executor)
        .teardown()
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.remaining, vec!["network"]);
    assert_eq!(client.count("delete"), 0);
}

/// 削除も同時実行数の上限を守る
#[tokio::test(start_paused = true)]
async fn test_teardown_concurrency_is_bounded() {
    let client = FakeClient::new();
    let store = MemoryLedgerStore::new();
    let ledger = open_ledger(&store).await;
    let executor = executor_with_concurrency(&client, ledger, 2);
    let descriptors: Vec<_> = ["a", "b", "c", "d"]
        .iter()
        .map(|id| network(id, &[]))
        .collect();
    let report = executor
        .apply(&plan(&descriptors, &[]).unwrap())
        .await
        .unwrap();
    assert!(report.is_success());

    client.slow_status(std::time::Duration::from_millis(500));
    let started = tokio::time::Instant::now();
    let report = TeardownCoordinator::new(&executor)
        .teardown()
        .await
        .unwrap();

    assert_eq!(report.destroyed.len(), 4);
    assert_eq!(client.peak_in_flight(), 2);
    assert!(started.elapsed() >= std::time::Duration::from_millis(1000));
}
