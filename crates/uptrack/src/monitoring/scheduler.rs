use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::aggregator::{UpdateAggregator, UpdateBatch};
use super::inspector::{InspectionOutcome, Inspector};
use super::probe::ProbeFactory;
use super::publisher::Publisher;
use super::shutdown_requested;
use crate::model::ServiceId;
use crate::store::{Catalog, TransitionLog};

/// Cadence of the inspection loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Pause between ordinary cycles
    pub cycle_interval: Duration,
    /// Pause after a reconciliation that found nothing to track
    pub idle_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(5 * 60),
            idle_backoff: Duration::from_secs(10 * 60),
        }
    }
}

/// How one cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The catalog was empty; nothing was probed
    Idle,
    /// Probes ran but no state changed
    Skipped,
    Published { transitions: usize },
    PublishFailed { transitions: usize },
}

impl CycleOutcome {
    /// Delay before the next reconciliation
    pub fn delay(&self, config: &SchedulerConfig) -> Duration {
        match self {
            CycleOutcome::Idle => config.idle_backoff,
            _ => config.cycle_interval,
        }
    }
}

/// Control loop: reconcile inspectors, probe concurrently, publish the batch
pub struct InspectionScheduler {
    catalog: Arc<dyn Catalog>,
    log: Arc<dyn TransitionLog>,
    publisher: Arc<dyn Publisher>,
    probes: Arc<dyn ProbeFactory>,
    inspectors: HashMap<ServiceId, Arc<Mutex<Inspector>>>,
    config: SchedulerConfig,
}

impl InspectionScheduler {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        log: Arc<dyn TransitionLog>,
        publisher: Arc<dyn Publisher>,
        probes: Arc<dyn ProbeFactory>,
        config: SchedulerConfig,
    ) -> Self {
        Self { catalog, log, publisher, probes, inspectors: HashMap::new(), config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Identifiers of every currently tracked service
    pub fn tracked(&self) -> Vec<ServiceId> {
        self.inspectors.keys().copied().collect()
    }

    pub fn inspector(&self, id: ServiceId) -> Option<Arc<Mutex<Inspector>>> {
        self.inspectors.get(&id).cloned()
    }

    /// Diff the inspector set against the catalog
    ///
    /// Surviving services keep their inspector (and probe state); new services
    /// get a fresh inspector; services gone from the catalog are dropped.
    pub async fn reconcile(&mut self) -> Result<usize> {
        let services = self.catalog.list_tracked_services().await?;
        let mut next = HashMap::with_capacity(services.len());

        for service in services {
            let id = service.id;
            if next.contains_key(&id) {
                warn!(service = %id, "Duplicate service in catalog, ignoring");
                continue;
            }

            let inspector = match self.inspectors.remove(&id) {
                Some(existing) => {
                    {
                        let mut inspector = existing.lock().await;
                        if inspector.service().kind != service.kind {
                            debug!(service = %id, kind = %service.kind, "Check kind changed, replacing probe");
                            inspector.replace_probe(self.probes.create(&service));
                        }
                        inspector.rebind(service);
                    }
                    existing
                }
                None => {
                    debug!(service = %id, name = %service.name, "Tracking new service");
                    let probe = self.probes.create(&service);
                    Arc::new(Mutex::new(Inspector::new(service, probe)))
                }
            };
            next.insert(id, inspector);
        }

        for id in self.inspectors.keys() {
            debug!(service = %id, "Service left the catalog, dropping inspector");
        }
        self.inspectors = next;
        Ok(self.inspectors.len())
    }

    /// Run one full cycle up to (but not including) the inter-cycle sleep
    pub async fn run_cycle(&mut self, shutdown: &watch::Receiver<bool>) -> Result<CycleOutcome> {
        let tracked = self.reconcile().await?;
        if tracked == 0 {
            warn!(
                "No services are tracked, retrying in {}s",
                self.config.idle_backoff.as_secs()
            );
            return Ok(CycleOutcome::Idle);
        }

        info!(tracked, "Starting inspection cycle");
        let aggregator = Arc::new(UpdateAggregator::new());
        let mut inspections = JoinSet::new();
        for inspector in self.inspectors.values() {
            let inspector = Arc::clone(inspector);
            let aggregator = Arc::clone(&aggregator);
            let log = Arc::clone(&self.log);
            let mut shutdown = shutdown.clone();
            inspections.spawn(async move {
                inspector.lock().await.inspect(log.as_ref(), &aggregator, &mut shutdown).await
            });
        }

        let mut failed = 0usize;
        while let Some(joined) = inspections.join_next().await {
            match joined {
                Ok(InspectionOutcome::Failed) => failed += 1,
                Ok(_) => {}
                Err(e) => {
                    failed += 1;
                    error!("Inspection task aborted: {}", e);
                }
            }
        }

        let batch = aggregator.build_update().await;
        debug!(transitions = batch.len(), failed, "Inspection cycle finished");

        if batch.is_empty() {
            return Ok(CycleOutcome::Skipped);
        }

        let transitions = batch.len();
        match self.publisher.publish_transitions(&batch).await {
            Ok(()) => {
                info!(transitions, "Published state transitions");
                Ok(CycleOutcome::Published { transitions })
            }
            Err(e) => {
                error!(transitions, "Failed to publish state transitions: {:#}", e);
                self.forget(&batch).await;
                Ok(CycleOutcome::PublishFailed { transitions })
            }
        }
    }

    /// Drop the last known state of every service in an unsent batch so the
    /// next cycle compares against the log again
    async fn forget(&self, batch: &UpdateBatch) {
        for id in batch.service_ids() {
            if let Some(inspector) = self.inspectors.get(&id) {
                inspector.lock().await.invalidate();
            }
        }
    }

    /// Loop until shutdown is requested
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Inspection scheduler started (cycle every {}s)",
            self.config.cycle_interval.as_secs()
        );

        loop {
            let stop = *shutdown.borrow();
            if stop {
                break;
            }

            let delay = match self.run_cycle(&shutdown).await {
                Ok(outcome) => outcome.delay(&self.config),
                Err(e) => {
                    error!("Failed to refresh the service catalog: {:#}", e);
                    self.config.cycle_interval
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        info!("Inspection scheduler stopped");
    }
}
