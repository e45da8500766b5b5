/// Monitoring engine module - schedules and runs inspections
///
/// This module is responsible for:
/// - Probing services over HTTP/HTTPS or TCP
/// - Binding probes to tracked services through inspectors
/// - Collecting each cycle's transitions into one batch
/// - Handing batches to the publishing collaborator
pub mod aggregator;
pub mod inspector;
pub mod probe;
pub mod publisher;
pub mod scheduler;

pub use aggregator::{UpdateAggregator, UpdateBatch};
pub use inspector::{InspectionOutcome, Inspector};
pub use probe::{DefaultProbeFactory, HttpProbe, Probe, ProbeFactory, TcpProbe};
pub use publisher::Publisher;
pub use scheduler::{CycleOutcome, InspectionScheduler, SchedulerConfig};

use tokio::sync::watch;

/// Resolves once shutdown is requested; never resolves if the sender is gone
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
