use tokio::sync::watch;
use tracing::{debug, warn};

use super::aggregator::UpdateAggregator;
use super::probe::Probe;
use super::shutdown_requested;
use crate::model::{Service, ServiceId, StateTransition};
use crate::store::TransitionLog;

/// What a single inspection produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectionOutcome {
    Unchanged,
    Changed { is_online: bool },
    Failed,
    Cancelled,
}

/// Runtime binding of one probe to one tracked service
pub struct Inspector {
    service: Service,
    probe: Box<dyn Probe>,
    last_known: Option<bool>,
    seeded: bool,
}

impl Inspector {
    pub fn new(service: Service, probe: Box<dyn Probe>) -> Self {
        Self { service, probe, last_known: None, seeded: false }
    }

    pub fn service_id(&self) -> ServiceId {
        self.service.id
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Last state this inspector saw or learned from the log
    pub fn last_known(&self) -> Option<bool> {
        self.last_known
    }

    /// Refresh the catalog entry in place; probe state is kept
    pub fn rebind(&mut self, service: Service) {
        debug_assert_eq!(self.service.id, service.id);
        self.service = service;
    }

    pub fn replace_probe(&mut self, mut probe: Box<dyn Probe>) {
        probe.seed(self.last_known);
        self.probe = probe;
    }

    /// Set the last known state explicitly, skipping the log lookup
    pub fn seed(&mut self, last_known: Option<bool>) {
        self.last_known = last_known;
        self.seeded = true;
        self.probe.seed(last_known);
    }

    /// Forget the last known state; the next inspection re-reads it from the log
    pub fn invalidate(&mut self) {
        self.last_known = None;
        self.seeded = false;
    }

    /// Probe once and report a transition if the verdict differs from the last
    /// known state
    pub async fn inspect(
        &mut self,
        log: &dyn TransitionLog,
        sink: &UpdateAggregator,
        shutdown: &mut watch::Receiver<bool>,
    ) -> InspectionOutcome {
        if !self.seeded {
            match log.last_transition(self.service.id).await {
                Ok(last) => self.seed(last.map(|t| t.is_online)),
                Err(e) => {
                    warn!(service = %self.service.id, "Failed to load last known state: {:#}", e);
                    return InspectionOutcome::Failed;
                }
            }
        }

        let verdict = tokio::select! {
            verdict = self.probe.check(&self.service) => verdict,
            _ = shutdown_requested(shutdown) => return InspectionOutcome::Cancelled,
        };

        match verdict {
            Ok(is_online) if self.last_known == Some(is_online) => InspectionOutcome::Unchanged,
            Ok(is_online) => {
                let transition = StateTransition::new(self.service.id, is_online);
                if !sink.record(transition).await {
                    return InspectionOutcome::Unchanged;
                }
                debug!(service = %self.service.id, is_online, "State change observed");
                self.last_known = Some(is_online);
                InspectionOutcome::Changed { is_online }
            }
            Err(e) => {
                warn!(service = %self.service.id, name = %self.service.name, "Probe failed: {:#}", e);
                InspectionOutcome::Failed
            }
        }
    }
}
