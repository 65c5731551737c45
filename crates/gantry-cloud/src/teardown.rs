//! Teardown coordinator
//!
//! Destroys ledger records in reverse dependency order. A record becomes
//! eligible once nothing left in the ledger depends on it, so every
//! dependent is `Destroyed` before its dependency's delete call is issued.

use crate::client::ExternalStatus;
use crate::error::{CloudError, Result};
use crate::executor::Executor;
use crate::ledger::{ExecutionState, LedgerRecord};
use crate::report::TeardownReport;
use crate::retry::{sleep_or_cancel, with_retry};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Reverse-order destruction of everything in the ledger
pub struct TeardownCoordinator {
    executor: Executor,
}

impl TeardownCoordinator {
    /// Share the executor's context, clients, ledger, tunables and token
    pub fn new(executor: &Executor) -> Self {
        Self {
            executor: executor.clone(),
        }
    }

    /// Destroy every record the ledger holds
    ///
    /// A failed delete halts its branch: the record stays `Failed` and its
    /// dependencies stay in the ledger as `remaining`. Independent branches
    /// carry on.
    pub async fn teardown(&self) -> Result<TeardownReport> {
        let started = Instant::now();
        let mut report = TeardownReport::new();
        let mut halted: HashSet<String> = HashSet::new();
        let semaphore = Arc::new(Semaphore::new(self.executor.config.concurrency.max(1)));
        let mut wave_index = 0;

        loop {
            if self.executor.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let records = self.executor.ledger.snapshot().await;
            let wave = eligible(&records, &halted);
            if wave.is_empty() {
                break;
            }

            tracing::info!(wave = wave_index, records = wave.len(), "Starting teardown wave");
            wave_index += 1;

            let mut set = JoinSet::new();
            for record in wave {
                let executor = self.executor.clone();
                let semaphore = semaphore.clone();
                set.spawn(async move {
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) => destroy(&executor, &record).await,
                        Err(e) => Err(CloudError::TaskFailed(e.to_string())),
                    };
                    (record.id, result)
                });
            }

            let mut fatal = None;
            while let Some(joined) = set.join_next().await {
                let (id, result) = match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(error = %e, "Teardown task failed");
                        fatal.get_or_insert(CloudError::TaskFailed(e.to_string()));
                        continue;
                    }
                };

                match result {
                    Ok(()) => report.destroyed.push(id),
                    Err(CloudError::Cancelled) => {
                        report.cancelled = true;
                        halted.insert(id);
                    }
                    Err(e) if e.is_fatal() => {
                        fatal.get_or_insert(e);
                        halted.insert(id);
                    }
                    Err(e) => {
                        tracing::error!(id = %id, error = %e, "Delete failed, halting branch");
                        report.add_failure(id.clone(), &e);
                        halted.insert(id);
                    }
                }
            }

            if let Some(e) = fatal {
                return Err(e);
            }
        }

        let failed: HashSet<&str> = report.failed.iter().map(|f| f.id.as_str()).collect();
        report.remaining = self
            .executor
            .ledger
            .snapshot()
            .await
            .into_iter()
            .map(|r| r.id)
            .filter(|id| !failed.contains(id.as_str()))
            .collect();
        report.remaining.sort();
        report.failed.sort_by(|a, b| a.id.cmp(&b.id));

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(%report, "Teardown finished");
        Ok(report)
    }
}

/// Records nothing else in the ledger depends on, highest rank first
fn eligible(records: &[LedgerRecord], halted: &HashSet<String>) -> Vec<LedgerRecord> {
    let mut wave: Vec<LedgerRecord> = records
        .iter()
        .filter(|r| !halted.contains(&r.id))
        .filter(|r| !records.iter().any(|other| other.depends_on.contains(&r.id)))
        .cloned()
        .collect();
    wave.sort_by(|a, b| b.rank.cmp(&a.rank).then_with(|| a.id.cmp(&b.id)));
    wave
}

/// Delete one record and wait until the resource is gone
async fn destroy(executor: &Executor, record: &LedgerRecord) -> Result<()> {
    let id = record.id.as_str();
    let ledger = &executor.ledger;

    if executor.cancel.is_cancelled() {
        return Err(CloudError::Cancelled);
    }

    // Nothing was ever issued for it
    if record.state == ExecutionState::Pending {
        tracing::info!(id, "Dropping pending record");
        ledger.remove(id).await?;
        return Ok(());
    }

    let client = executor.clients.get(record.kind)?;
    let descriptor = record.descriptor();

    tracing::info!(id, kind = %record.kind, identity = %record.external_identity, "Destroying");
    ledger
        .transition(id, ExecutionState::Destroying, None)
        .await?;

    let label = format!("delete {}", id);
    let deleted = with_retry(&executor.config.retry, &executor.cancel, &label, || {
        client.delete(&executor.ctx, &descriptor)
    })
    .await;
    match deleted {
        Ok(()) => {}
        Err(CloudError::ResourceNotFound(_)) => {
            tracing::info!(id, "Already absent");
        }
        Err(e) => return fail(executor, id, e).await,
    }

    let policy = executor.config.policies.policy_for(record.kind);
    let started = Instant::now();
    loop {
        let status = match client.get_status(&executor.ctx, &descriptor).await {
            Ok(status) => status,
            Err(CloudError::ResourceNotFound(_)) => ExternalStatus::absent(),
            Err(e) if e.is_transient() => {
                tracing::warn!(id, error = %e, "Transient status error");
                ExternalStatus::present().with_message(e.to_string())
            }
            Err(e) => return fail(executor, id, e).await,
        };

        if !status.exists {
            ledger
                .transition(id, ExecutionState::Destroyed, None)
                .await?;
            tracing::info!(id, "Destroyed");
            return Ok(());
        }

        if started.elapsed() + policy.interval >= policy.timeout {
            let error = CloudError::ReadinessTimeout {
                id: id.to_string(),
                timeout: policy.timeout,
                diagnostic: format!("still present: {}", status.describe()),
            };
            return fail(executor, id, error).await;
        }

        if let Err(e) = sleep_or_cancel(policy.interval, &executor.cancel).await {
            return fail(executor, id, e).await;
        }
    }
}

/// Cancellation leaves the record `Destroying` so the next teardown resumes it
async fn fail(executor: &Executor, id: &str, error: CloudError) -> Result<()> {
    if matches!(error, CloudError::Cancelled) || error.is_fatal() {
        return Err(error);
    }
    executor
        .ledger
        .transition(id, ExecutionState::Failed, Some(error.to_string()))
        .await?;
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{NamespaceSpec, ResourceDescriptor, ResourceSpec};

    fn record(id: &str, rank: usize, deps: &[&str]) -> LedgerRecord {
        let descriptor = ResourceDescriptor::new(
            id,
            ResourceSpec::Namespace(NamespaceSpec {
                name: id.to_string(),
                labels: Default::default(),
            }),
        )
        .depends_on(deps.iter().copied());
        LedgerRecord::new(&descriptor, rank, id).with_state(ExecutionState::Ready)
    }

    #[test]
    fn test_leaves_are_eligible_first() {
        let records = vec![
            record("network", 0, &[]),
            record("subnet", 1, &["network"]),
            record("bucket", 0, &[]),
            record("cluster", 2, &["subnet"]),
        ];

        let ids: Vec<String> = eligible(&records, &HashSet::new())
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["cluster", "bucket"]);
    }

    #[test]
    fn test_halted_records_are_skipped() {
        let records = vec![record("network", 0, &[]), record("subnet", 1, &["network"])];
        let halted: HashSet<String> = ["subnet".to_string()].into_iter().collect();

        assert!(eligible(&records, &halted).is_empty());
    }
}
