#![allow(dead_code)]

use async_trait::async_trait;
use gantry_cloud::{
    ClientRegistry, CloudError, Executor, ExecutorConfig, ExternalStatus, Ledger,
    MemoryLedgerStore, PollPolicy, ReadinessPolicies, ResourceClient, Result, RetryConfig,
};
use gantry_core::{
    Context, ManagedCertificateSpec, NetworkSpec, NodePoolSpec, ResourceDescriptor, ResourceKind,
    ResourceSpec,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// One recorded client call
#[derive(Debug, Clone)]
pub struct Call {
    pub op: &'static str,
    pub id: String,
    pub at: Instant,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    existing: HashSet<String>,
    create_errors: HashMap<String, VecDeque<CloudError>>,
    delete_errors: HashMap<String, VecDeque<CloudError>>,
    /// Scripted statuses; the last one repeats
    statuses: HashMap<String, VecDeque<ExternalStatus>>,
    /// Handle of the last submitted operation per id
    operations: HashMap<String, String>,
    /// Handles re-attached from the ledger
    restored: Vec<(String, String)>,
    submissions: usize,
    status_delay: Option<Duration>,
    in_flight: usize,
    peak_in_flight: usize,
}

/// Scripted in-memory control plane
#[derive(Default)]
pub struct FakeClient {
    state: Mutex<FakeState>,
}

impl FakeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn fail_create(&self, id: &str, errors: Vec<CloudError>) {
        self.with_state(|s| s.create_errors.insert(id.to_string(), errors.into()));
    }

    pub fn fail_delete(&self, id: &str, errors: Vec<CloudError>) {
        self.with_state(|s| s.delete_errors.insert(id.to_string(), errors.into()));
    }

    pub fn script_status(&self, id: &str, statuses: Vec<ExternalStatus>) {
        self.with_state(|s| s.statuses.insert(id.to_string(), statuses.into()));
    }

    /// Every status call takes this long
    pub fn slow_status(&self, delay: Duration) {
        self.with_state(|s| s.status_delay = Some(delay));
    }

    /// Most status calls outstanding at once
    pub fn peak_in_flight(&self) -> usize {
        self.with_state(|s| s.peak_in_flight)
    }

    pub fn restored(&self) -> Vec<(String, String)> {
        self.with_state(|s| s.restored.clone())
    }

    /// Pretend the resource already exists externally
    pub fn seed(&self, id: &str) {
        self.with_state(|s| s.existing.insert(id.to_string()));
    }

    /// Remove a resource behind the sequencer's back
    pub fn forget(&self, id: &str) {
        self.with_state(|s| s.existing.remove(id));
    }

    pub fn exists(&self, id: &str) -> bool {
        self.with_state(|s| s.existing.contains(id))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn calls_of(&self, op: &str, id: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.op == op && c.id == id)
            .collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.op == op).count()
    }

    /// Ids in the order `op` was called for them
    pub fn order_of(&self, op: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.op == op)
            .map(|c| c.id)
            .collect()
    }

    fn submitted(state: &mut FakeState, id: &str) {
        state.submissions += 1;
        state
            .operations
            .insert(id.to_string(), format!("op-{}-{}", id, state.submissions));
    }

    fn record(&self, state: &mut FakeState, op: &'static str, id: &str) {
        state.calls.push(Call {
            op,
            id: id.to_string(),
            at: Instant::now(),
        });
    }
}

#[async_trait]
impl ResourceClient for FakeClient {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create(&self, _ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "create", &descriptor.id);
        if let Some(error) = state
            .create_errors
            .get_mut(&descriptor.id)
            .and_then(|errors| errors.pop_front())
        {
            return Err(error);
        }
        if !state.existing.insert(descriptor.id.clone()) {
            return Err(CloudError::ResourceAlreadyExists(descriptor.id.clone()));
        }
        Self::submitted(&mut state, &descriptor.id);
        Ok(())
    }

    async fn update(&self, _ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "update", &descriptor.id);
        if !state.existing.contains(&descriptor.id) {
            return Err(CloudError::ResourceNotFound(descriptor.id.clone()));
        }
        Self::submitted(&mut state, &descriptor.id);
        Ok(())
    }

    async fn get_status(
        &self,
        _ctx: &Context,
        descriptor: &ResourceDescriptor,
    ) -> Result<ExternalStatus> {
        let delay = self.with_state(|state| {
            self.record(state, "status", &descriptor.id);
            state.in_flight += 1;
            state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
            state.status_delay
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.in_flight -= 1;
        if !state.existing.contains(&descriptor.id) {
            return Ok(ExternalStatus::absent());
        }
        if let Some(script) = state.statuses.get_mut(&descriptor.id) {
            let status = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            };
            if let Some(status) = status {
                return Ok(status);
            }
        }
        Ok(ExternalStatus::present())
    }

    async fn delete(&self, _ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "delete", &descriptor.id);
        if let Some(error) = state
            .delete_errors
            .get_mut(&descriptor.id)
            .and_then(|errors| errors.pop_front())
        {
            return Err(error);
        }
        if !state.existing.remove(&descriptor.id) {
            return Err(CloudError::ResourceNotFound(descriptor.id.clone()));
        }
        Ok(())
    }

    fn operation_handle(&self, descriptor: &ResourceDescriptor) -> Option<String> {
        self.with_state(|s| s.operations.get(&descriptor.id).cloned())
    }

    fn restore_operation(&self, descriptor: &ResourceDescriptor, handle: &str) {
        self.with_state(|s| {
            s.restored
                .push((descriptor.id.clone(), handle.to_string()));
            s.operations
                .insert(descriptor.id.clone(), handle.to_string());
        });
    }
}

pub fn context() -> Context {
    Context::new("acme-test", "asia-northeast1")
}

pub fn registry(client: &Arc<FakeClient>) -> ClientRegistry {
    let mut registry = ClientRegistry::new();
    for kind in ResourceKind::ALL {
        registry.register(kind, client.clone() as Arc<dyn ResourceClient>);
    }
    registry
}

/// Small delays so scenarios finish quickly under paused time
pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        concurrency: 4,
        retry: RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        },
        policies: ReadinessPolicies::uniform(PollPolicy::new(1, 60)),
    }
}

pub async fn open_ledger(store: &MemoryLedgerStore) -> Arc<Ledger> {
    Arc::new(Ledger::open(store.clone()).await.unwrap())
}

pub fn executor(client: &Arc<FakeClient>, ledger: Arc<Ledger>) -> Executor {
    Executor::new(context(), registry(client), ledger).with_config(fast_config())
}

pub fn executor_with_concurrency(
    client: &Arc<FakeClient>,
    ledger: Arc<Ledger>,
    concurrency: usize,
) -> Executor {
    Executor::new(context(), registry(client), ledger).with_config(ExecutorConfig {
        concurrency,
        ..fast_config()
    })
}

pub fn network(id: &str, deps: &[&str]) -> ResourceDescriptor {
    ResourceDescriptor::new(
        id,
        ResourceSpec::Network(NetworkSpec {
            name: id.to_string(),
            auto_subnets: false,
            routing_mode: None,
        }),
    )
    .depends_on(deps.iter().copied())
}

pub fn certificate(id: &str, deps: &[&str]) -> ResourceDescriptor {
    ResourceDescriptor::new(
        id,
        ResourceSpec::ManagedCertificate(ManagedCertificateSpec {
            name: id.to_string(),
            namespace: "default".to_string(),
            domains: vec!["app.example.com".to_string()],
        }),
    )
    .depends_on(deps.iter().copied())
}

pub fn node_pool(id: &str, min_nodes: u32) -> ResourceDescriptor {
    ResourceDescriptor::new(
        id,
        ResourceSpec::NodePool(NodePoolSpec {
            name: id.to_string(),
            cluster: "main".to_string(),
            location: None,
            machine_type: "e2-standard-4".to_string(),
            min_nodes,
            max_nodes: min_nodes,
            disk_size_gb: None,
            spot: false,
            service_account: None,
        }),
    )
}
