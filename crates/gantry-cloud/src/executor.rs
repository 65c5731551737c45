//! Step executor
//!
//! Drives plan entries through `Pending -> InProgress -> Ready`, one batch at
//! a time. Entries inside a batch run concurrently up to the configured limit;
//! the next batch starts only once every entry of the current one settled.

use crate::client::{ClientRegistry, ExternalStatus, ResourceClient};
use crate::error::{CloudError, Result};
use crate::ledger::{ExecutionState, Ledger};
use crate::oracle::{KindOracle, PollProgress, Readiness, ReadinessOracle, ReadinessPolicies};
use crate::planner::{Plan, PlanAction, PlanEntry};
use crate::report::RunReport;
use crate::retry::{RetryConfig, sleep_or_cancel, with_retry};
use gantry_core::Context;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Executor tunables
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum entries in flight within one batch
    pub concurrency: usize,
    pub retry: RetryConfig,
    pub policies: ReadinessPolicies,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry: RetryConfig::default(),
            policies: ReadinessPolicies::default(),
        }
    }
}

/// Plan executor
///
/// Cheap to clone; every clone shares the ledger, clients and cancellation
/// token.
#[derive(Clone)]
pub struct Executor {
    pub(crate) ctx: Arc<Context>,
    pub(crate) clients: Arc<ClientRegistry>,
    pub(crate) oracle: Arc<dyn ReadinessOracle>,
    pub(crate) ledger: Arc<Ledger>,
    pub(crate) config: Arc<ExecutorConfig>,
    pub(crate) cancel: CancellationToken,
}

impl Executor {
    pub fn new(ctx: Context, clients: ClientRegistry, ledger: Arc<Ledger>) -> Self {
        Self {
            ctx: Arc::new(ctx),
            clients: Arc::new(clients),
            oracle: Arc::new(KindOracle::default()),
            ledger,
            config: Arc::new(ExecutorConfig::default()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn ReadinessOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Execute a plan to convergence
    ///
    /// Entry-level failures end up in the report; only fatal errors (ledger
    /// corruption, invalid transitions, I/O) abort the run with `Err`.
    pub async fn apply(&self, plan: &Plan) -> Result<RunReport> {
        let started = Instant::now();
        let mut report = RunReport::new();
        report.unchanged = plan.unchanged.clone();

        for entry in plan.entries() {
            let identity = entry.descriptor.external_identity(&self.ctx);
            self.ledger.register(entry, identity).await?;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        // Failed, blocked or cancelled ids
        let mut unhealthy: HashSet<String> = HashSet::new();

        for batch in &plan.batches {
            if self.cancel.is_cancelled() {
                report
                    .cancelled
                    .extend(batch.entries.iter().map(|e| e.descriptor.id.clone()));
                continue;
            }

            tracing::info!(
                batch = batch.index,
                entries = batch.entries.len(),
                "Starting batch"
            );

            let mut set = JoinSet::new();
            for entry in &batch.entries {
                if let Some(dep) = entry
                    .descriptor
                    .depends_on
                    .iter()
                    .find(|dep| unhealthy.contains(*dep))
                {
                    self.mark_blocked(entry.id(), dep).await?;
                    report.blocked.push(entry.id().to_string());
                    unhealthy.insert(entry.id().to_string());
                    continue;
                }

                let executor = self.clone();
                let entry = entry.clone();
                let semaphore = semaphore.clone();
                set.spawn(async move {
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) => executor.execute(&entry).await,
                        Err(e) => Err(CloudError::TaskFailed(e.to_string())),
                    };
                    (entry.descriptor.id, result)
                });
            }

            let mut fatal = None;
            while let Some(joined) = set.join_next().await {
                let (id, result) = match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(error = %e, "Entry task failed");
                        fatal.get_or_insert(CloudError::TaskFailed(e.to_string()));
                        continue;
                    }
                };

                match result {
                    Ok(()) => report.ready.push(id),
                    Err(CloudError::Cancelled) => {
                        report.cancelled.push(id.clone());
                        unhealthy.insert(id);
                    }
                    Err(CloudError::DependencyNotReady { .. }) => {
                        report.blocked.push(id.clone());
                        unhealthy.insert(id);
                    }
                    Err(e) if e.is_fatal() => {
                        tracing::error!(id = %id, error = %e, "Fatal error, aborting run");
                        fatal.get_or_insert(e);
                        unhealthy.insert(id);
                    }
                    Err(e) => {
                        report.add_failure(id.clone(), &e);
                        unhealthy.insert(id);
                    }
                }
            }

            if let Some(e) = fatal {
                return Err(e);
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        report.sort();
        tracing::info!(%report, "Apply finished");
        Ok(report)
    }

    /// Drive one entry to `Ready`
    ///
    /// Returns `DependencyNotReady` without touching the external world when
    /// any dependency is not `Ready` in the ledger.
    pub async fn execute(&self, entry: &PlanEntry) -> Result<()> {
        let id = entry.id();
        let descriptor = &entry.descriptor;

        if self.cancel.is_cancelled() {
            return Err(CloudError::Cancelled);
        }

        for dep in &descriptor.depends_on {
            let state = self.ledger.state(dep).await;
            if state != Some(ExecutionState::Ready) {
                self.mark_blocked(id, dep).await?;
                return Err(CloudError::DependencyNotReady {
                    id: id.to_string(),
                    dependency: dep.clone(),
                    state: state.map_or_else(|| "absent".to_string(), |s| s.to_string()),
                });
            }
        }

        tracing::info!(
            id,
            kind = %descriptor.kind(),
            action = %entry.action,
            "Executing entry"
        );
        self.ledger
            .transition(id, ExecutionState::InProgress, None)
            .await?;

        let client = match self.clients.get(descriptor.kind()) {
            Ok(client) => client,
            Err(e) => return self.fail(id, e).await,
        };

        let label = format!("{} {}", entry.action, id);
        let submitted = match entry.action {
            PlanAction::Create => self.create_or_adopt(client.as_ref(), entry, &label).await,
            PlanAction::Update => self.update_or_create(client.as_ref(), entry, &label).await,
            PlanAction::Resume => self.resume(client.as_ref(), entry, &label).await,
        };
        if let Err(e) = submitted {
            return self.fail(id, e).await;
        }

        self.await_ready(entry, client.as_ref()).await
    }

    /// Issue the create call; an existing resource is adopted
    async fn create_or_adopt(
        &self,
        client: &dyn ResourceClient,
        entry: &PlanEntry,
        label: &str,
    ) -> Result<()> {
        let id = entry.id();
        let descriptor = &entry.descriptor;
        match with_retry(&self.config.retry, &self.cancel, label, || {
            client.create(&self.ctx, descriptor)
        })
        .await
        {
            Ok(()) => {}
            Err(CloudError::ResourceAlreadyExists(detail)) => {
                tracing::info!(id, %detail, "Resource already exists, adopting");
            }
            Err(e) => return Err(e),
        }
        self.ledger
            .record_operation(id, client.operation_handle(descriptor))
            .await
    }

    /// Issue the update call; a resource that turns out to be missing is created
    async fn update_or_create(
        &self,
        client: &dyn ResourceClient,
        entry: &PlanEntry,
        label: &str,
    ) -> Result<()> {
        let id = entry.id();
        let descriptor = &entry.descriptor;
        match with_retry(&self.config.retry, &self.cancel, label, || {
            client.update(&self.ctx, descriptor)
        })
        .await
        {
            Ok(()) => self
                .ledger
                .record_operation(id, client.operation_handle(descriptor))
                .await,
            Err(CloudError::ResourceNotFound(detail)) => {
                tracing::info!(id, %detail, "Resource missing, creating instead");
                self.create_or_adopt(client, entry, label).await
            }
            Err(e) => Err(e),
        }
    }

    /// Pick up an entry a previous run left `InProgress`
    ///
    /// The earlier run may have stopped before its create call was accepted,
    /// so the resource is observed first and created when absent.
    async fn resume(
        &self,
        client: &dyn ResourceClient,
        entry: &PlanEntry,
        label: &str,
    ) -> Result<()> {
        let id = entry.id();
        let descriptor = &entry.descriptor;

        if let Some(handle) = self.ledger.get(id).await.and_then(|r| r.operation) {
            tracing::debug!(id, %handle, "Restoring operation handle");
            client.restore_operation(descriptor, &handle);
        }

        let exists = match with_retry(&self.config.retry, &self.cancel, label, || {
            client.get_status(&self.ctx, descriptor)
        })
        .await
        {
            Ok(status) => status.exists,
            Err(CloudError::ResourceNotFound(_)) => false,
            Err(e) => return Err(e),
        };

        if exists {
            tracing::info!(id, "Resuming in-flight entry");
            Ok(())
        } else {
            tracing::info!(id, "In-flight entry was never created, issuing create");
            self.create_or_adopt(client, entry, label).await
        }
    }

    /// Poll until the oracle reports a terminal verdict or the kind's timeout
    async fn await_ready(&self, entry: &PlanEntry, client: &dyn ResourceClient) -> Result<()> {
        let id = entry.id();
        let descriptor = &entry.descriptor;
        let policy = self.config.policies.policy_for(descriptor.kind());
        let started = Instant::now();
        let mut progress = PollProgress::default();
        let mut diagnostic = String::from("no status observed");

        loop {
            let observed = match client.get_status(&self.ctx, descriptor).await {
                Ok(status) => Some(status),
                Err(CloudError::ResourceNotFound(_)) => Some(ExternalStatus::absent()),
                Err(e) if e.is_transient() => {
                    tracing::warn!(id, error = %e, "Transient status error");
                    diagnostic = e.to_string();
                    None
                }
                Err(e) => return self.fail(id, e).await,
            };

            if let Some(status) = observed {
                progress.observe(&status);
                match self.oracle.evaluate(descriptor, &status, &progress) {
                    Readiness::Ready => {
                        self.ledger
                            .transition(id, ExecutionState::Ready, None)
                            .await?;
                        tracing::info!(id, polls = progress.polls, "Resource ready");
                        return Ok(());
                    }
                    Readiness::Failed(reason) => {
                        let error = CloudError::ReadinessFailed {
                            id: id.to_string(),
                            reason,
                        };
                        return self.fail(id, error).await;
                    }
                    Readiness::NotReady(detail) => {
                        tracing::debug!(id, poll = progress.polls, %detail, "Not ready");
                        diagnostic = detail;
                    }
                }
            }

            if started.elapsed() + policy.interval >= policy.timeout {
                let error = CloudError::ReadinessTimeout {
                    id: id.to_string(),
                    timeout: policy.timeout,
                    diagnostic,
                };
                return self.fail(id, error).await;
            }

            if let Err(e) = sleep_or_cancel(policy.interval, &self.cancel).await {
                return self.fail(id, e).await;
            }
        }
    }

    /// Record a failed entry and hand the error back
    ///
    /// Cancellation leaves the record `InProgress` so the next run re-polls.
    async fn fail(&self, id: &str, error: CloudError) -> Result<()> {
        if matches!(error, CloudError::Cancelled) {
            tracing::warn!(id, "Cancelled while in progress");
            return Err(error);
        }
        if error.is_fatal() {
            return Err(error);
        }

        tracing::error!(id, error = %error, "Entry failed");
        self.ledger
            .transition(id, ExecutionState::Failed, Some(error.to_string()))
            .await?;
        Err(error)
    }

    async fn mark_blocked(&self, id: &str, dependency: &str) -> Result<()> {
        tracing::warn!(id, dependency, "Blocked by dependency");
        match self.ledger.state(id).await {
            // Already exists externally; leave its record untouched
            Some(ExecutionState::Ready | ExecutionState::InProgress) => Ok(()),
            _ => {
                let reason = format!("dependency '{}' is not ready", dependency);
                self.ledger
                    .transition(id, ExecutionState::Blocked, Some(reason))
                    .await
            }
        }
    }
}
