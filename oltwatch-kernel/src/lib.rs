/*!
 * OLTWATCH KERNEL - OLT fleet telemetry poller
 *
 * ROLE: Periodically opens CLI sessions on every OLT of the inventory,
 * scrapes optical power, ONT descriptions, system health, port protection
 * state and configuration backups, and persists the results per host.
 *
 * ARCHITECTURE: inventory -> bounded dispatcher -> text extractors -> store,
 * driven by one independent timer per job.
 */

pub mod backup;
pub mod config;
pub mod dispatch;
pub mod extract;
pub mod inventory;
pub mod jobs;
pub mod models;
pub mod report;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod store;
pub mod tracker;

pub use config::{load_config, PollerConfig};
pub use dispatch::Dispatcher;
pub use jobs::{run_job, JobKind, JobReport, ScanContext, ScanJob};
pub use scheduler::Scheduler;
pub use store::{JsonFileStore, MemoryStore, Snapshot, TelemetryStore};
pub use tracker::JobTracker;
