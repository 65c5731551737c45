//! gantry provisioning engine
//!
//! Takes the resource descriptors of an infra document and drives the live
//! environment to that state, in dependency order, resumably.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   gantry CLI                     │
//! │            (plan / apply / destroy)              │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 gantry-cloud                     │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────────┐   │
//! │  │ Planner  │─▶│ Executor │─▶│   Readiness  │   │
//! │  └──────────┘  └────┬─────┘  │    Oracle    │   │
//! │                     │        └──────────────┘   │
//! │  ┌──────────┐  ┌────▼─────┐                     │
//! │  │ Teardown │─▶│  Ledger  │  .gantry/ledger.json│
//! │  └──────────┘  └──────────┘                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │   trait ResourceClient { ... }           │   │
//! │  └──────────────────────────────────────────┘   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼───────┐
//!           │  gcp clients  │
//!           │ gcloud/kubectl│
//!           │ aws route53   │
//!           └───────────────┘
//! ```

pub mod client;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod oracle;
pub mod planner;
pub mod report;
pub mod retry;
pub mod teardown;

// Re-exports
pub use client::{AuthStatus, ClientRegistry, ExternalStatus, ResourceClient};
pub use error::{CloudError, Result};
pub use executor::{Executor, ExecutorConfig};
pub use ledger::{
    ExecutionState, FileLedgerStore, Ledger, LedgerDocument, LedgerLock, LedgerRecord,
    LedgerStore, MemoryLedgerStore,
};
pub use oracle::{KindOracle, PollPolicy, PollProgress, Readiness, ReadinessOracle, ReadinessPolicies};
pub use planner::{Batch, Plan, PlanAction, PlanEntry, PlanSummary, plan};
pub use report::{EntryFailure, RunReport, TeardownReport};
pub use retry::{RetryConfig, sleep_or_cancel, with_retry};
pub use teardown::TeardownCoordinator;
