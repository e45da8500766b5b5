use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::outage::OutageWindowCache;
use super::uptime::UptimeCache;
use crate::error::StatusError;
use crate::model::{NewReport, OfflineReport, Service, ServiceId, StateTransition};
use crate::store::{Catalog, ReportStore, TransitionLog};

/// Uptime figures of one service at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UptimeReport {
    pub service_id: ServiceId,
    pub total_seconds: i64,
    pub online_seconds: i64,
    pub ratio: f64,
    pub is_online: bool,
}

/// Owner of the transition write path and the derived read models
///
/// Every transition goes through `record_transition`, which enforces
/// alternation and keeps both caches consistent with the log.
pub struct StatusService {
    catalog: Arc<dyn Catalog>,
    log: Arc<dyn TransitionLog>,
    reports: Arc<dyn ReportStore>,
    uptime: UptimeCache,
    outages: OutageWindowCache,
}

impl StatusService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        log: Arc<dyn TransitionLog>,
        reports: Arc<dyn ReportStore>,
    ) -> Self {
        Self {
            catalog,
            log,
            reports,
            uptime: UptimeCache::new(),
            outages: OutageWindowCache::new(),
        }
    }

    pub fn uptime_cache(&self) -> &UptimeCache {
        &self.uptime
    }

    pub fn outage_cache(&self) -> &OutageWindowCache {
        &self.outages
    }

    /// Append a transition to the log
    ///
    /// Rejected for services missing from the catalog, and when it repeats
    /// the latest state or predates it. The service's uptime slot stays locked
    /// from the check until the cached summary has absorbed the transition, so
    /// each transition is counted exactly once.
    /// The outage slot is held across the append, so no reader sees the old
    /// window once the transition is in the log.
    pub async fn record_transition(&self, transition: StateTransition) -> Result<(), StatusError> {
        let service_id = transition.service_id;
        if self.catalog.get_service(service_id).await?.is_none() {
            return Err(StatusError::UnknownService(service_id));
        }

        let slot = self.uptime.slot(service_id).await;
        let mut summary = slot.lock().await;

        if let Some(latest) = self.log.last_transition(service_id).await? {
            if latest.is_online == transition.is_online {
                warn!(
                    target: "uptrack::audit",
                    service = %service_id,
                    is_online = transition.is_online,
                    "Rejected transition repeating the current state"
                );
                return Err(StatusError::UnchangedState {
                    service_id,
                    is_online: transition.is_online,
                });
            }
            if transition.timestamp < latest.timestamp {
                return Err(StatusError::OutOfOrder {
                    service_id,
                    timestamp: transition.timestamp,
                    latest: latest.timestamp,
                });
            }
        }

        let window_slot = self.outages.slot(service_id).await;
        let mut window = window_slot.lock().await;
        self.log.append(&transition).await?;
        *window = None;
        drop(window);

        if let Some(summary) = summary.as_mut() {
            summary.advance(&transition);
        }
        drop(summary);

        info!(
            target: "uptrack::audit",
            service = %service_id,
            is_online = transition.is_online,
            "Recorded state transition"
        );
        Ok(())
    }

    /// Uptime ratio in `[0, 1]` rounded to two decimals, `None` if never observed
    pub async fn uptime(&self, service_id: ServiceId) -> Result<Option<f64>, StatusError> {
        self.uptime_at(service_id, Utc::now()).await
    }

    pub async fn uptime_at(
        &self,
        service_id: ServiceId,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>, StatusError> {
        Ok(self.uptime_report_at(service_id, now).await?.map(|report| report.ratio))
    }

    pub async fn uptime_report(&self, service_id: ServiceId) -> Result<Option<UptimeReport>, StatusError> {
        self.uptime_report_at(service_id, Utc::now()).await
    }

    pub async fn uptime_report_at(
        &self,
        service_id: ServiceId,
        now: DateTime<Utc>,
    ) -> Result<Option<UptimeReport>, StatusError> {
        let Some(summary) = self.uptime.summary(self.log.as_ref(), service_id).await? else {
            return Ok(None);
        };
        let closed = summary.closed_at(now);
        Ok(Some(UptimeReport {
            service_id,
            total_seconds: closed.total_seconds,
            online_seconds: closed.online_seconds,
            ratio: closed.ratio(),
            is_online: summary.latest().is_online,
        }))
    }

    /// Latest recorded state, `None` if never observed
    pub async fn current_state(&self, service_id: ServiceId) -> Result<Option<bool>, StatusError> {
        Ok(self.log.last_transition(service_id).await?.map(|t| t.is_online))
    }

    /// Catalog entry, `None` for unknown identifiers
    pub async fn service(&self, service_id: ServiceId) -> Result<Option<Service>, StatusError> {
        Ok(self.catalog.get_service(service_id).await?)
    }

    /// Reports raised during the currently open outage
    pub async fn open_reports(&self, service_id: ServiceId) -> Result<Vec<OfflineReport>, StatusError> {
        Ok(self
            .outages
            .open_reports(self.log.as_ref(), self.reports.as_ref(), service_id)
            .await?)
    }

    pub async fn record_report(&self, report: NewReport) -> Result<OfflineReport, StatusError> {
        if self.catalog.get_service(report.service_id).await?.is_none() {
            return Err(StatusError::UnknownService(report.service_id));
        }

        let stored = self
            .outages
            .record_report(self.log.as_ref(), self.reports.as_ref(), report, Utc::now().trunc_subsecs(3))
            .await?;
        info!(
            target: "uptrack::audit",
            service = %stored.service_id,
            issuer = %stored.issuer_id,
            solved = stored.is_solved,
            "Recorded offline report"
        );
        Ok(stored)
    }

    /// Mark a report solved; `false` if the service has no such report
    pub async fn resolve_report(&self, service_id: ServiceId, report_id: i64) -> Result<bool, StatusError> {
        let solved = self.reports.mark_solved(service_id, report_id).await?;
        if solved {
            self.outages.invalidate(service_id).await;
            info!(target: "uptrack::audit", service = %service_id, report_id, "Resolved offline report");
        }
        Ok(solved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::model::CheckKind;
    use crate::store::TransitionLog;
    use chrono::Duration;
    use tokio::sync::{Notify, Semaphore};

    async fn status_with_service() -> (Arc<MemoryStore>, StatusService, Service) {
        let store = Arc::new(MemoryStore::new());
        let service = Service::new("eduroam", "radius.example.edu:1812", CheckKind::Tcp);
        store.upsert_service(service.clone()).await;
        let status = StatusService::new(store.clone(), store.clone(), store.clone());
        (store, status, service)
    }

    #[tokio::test]
    async fn test_out_of_order_transition_is_rejected() {
        let (_store, status, service) = status_with_service().await;
        let now = Utc::now();
        status
            .record_transition(StateTransition::at(service.id, now, true))
            .await
            .unwrap();

        let stale = StateTransition::at(service.id, now - Duration::minutes(1), false);
        assert!(matches!(
            status.record_transition(stale).await,
            Err(StatusError::OutOfOrder { .. })
        ));
    }

    #[tokio::test]
    async fn test_reports_for_unknown_service_are_refused() {
        let (_store, status, _service) = status_with_service().await;
        let stranger = uuid::Uuid::new_v4();
        let result = status
            .record_report(NewReport {
                service_id: stranger,
                issuer_id: "x".to_string(),
                content: "down?".to_string(),
                claimed_online: false,
            })
            .await;
        assert!(matches!(result, Err(StatusError::UnknownService(id)) if id == stranger));
        assert_eq!(status.service(stranger).await.unwrap(), None);
        assert_eq!(status.uptime(stranger).await.unwrap(), None);
        assert_eq!(status.current_state(stranger).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_transitions_for_unknown_service_are_refused() {
        let (store, status, _service) = status_with_service().await;
        let stranger = uuid::Uuid::new_v4();

        let result = status.record_transition(StateTransition::new(stranger, true)).await;
        assert!(matches!(result, Err(StatusError::UnknownService(id)) if id == stranger));
        assert!(store.history(stranger).await.unwrap().is_empty());
        assert_eq!(status.uptime(stranger).await.unwrap(), None);
        assert!(!status.uptime_cache().is_cached(stranger).await);
    }

    /// Transition log whose appends wait until the test lets them through
    struct GatedLog {
        inner: Arc<MemoryStore>,
        entered: Notify,
        release: Semaphore,
    }

    #[async_trait::async_trait]
    impl TransitionLog for GatedLog {
        async fn history(&self, service_id: ServiceId) -> anyhow::Result<Vec<StateTransition>> {
            self.inner.history(service_id).await
        }

        async fn last_transition(&self, service_id: ServiceId) -> anyhow::Result<Option<StateTransition>> {
            self.inner.last_transition(service_id).await
        }

        async fn append(&self, transition: &StateTransition) -> anyhow::Result<()> {
            self.entered.notify_one();
            self.release.acquire().await?.forget();
            self.inner.append(transition).await
        }
    }

    #[tokio::test]
    async fn test_readers_never_see_the_window_of_a_closed_outage() {
        let store = Arc::new(MemoryStore::new());
        let service = Service::new("library proxy", "https://proxy.example.edu", CheckKind::Http);
        store.upsert_service(service.clone()).await;
        let gated = Arc::new(GatedLog {
            inner: store.clone(),
            entered: Notify::new(),
            release: Semaphore::new(1),
        });
        let status = Arc::new(StatusService::new(store.clone(), gated.clone(), store.clone()));

        status
            .record_transition(StateTransition::at(service.id, Utc::now() - Duration::minutes(5), false))
            .await
            .unwrap();
        gated.entered.notified().await;
        status
            .record_report(NewReport {
                service_id: service.id,
                issuer_id: "staff-2".to_string(),
                content: "proxy times out".to_string(),
                claimed_online: false,
            })
            .await
            .unwrap();
        assert_eq!(status.open_reports(service.id).await.unwrap().len(), 1);

        let writer = {
            let status = status.clone();
            let id = service.id;
            tokio::spawn(async move { status.record_transition(StateTransition::new(id, true)).await })
        };
        gated.entered.notified().await;

        let reader = {
            let status = status.clone();
            let id = service.id;
            tokio::spawn(async move { status.open_reports(id).await })
        };
        tokio::task::yield_now().await;
        gated.release.add_permits(1);

        writer.await.unwrap().unwrap();
        assert!(reader.await.unwrap().unwrap().is_empty());
        assert!(!status.outage_cache().is_cached(service.id).await);
    }

    #[tokio::test]
    async fn test_resolving_a_report_drops_the_window() {
        let (_store, status, service) = status_with_service().await;
        status
            .record_transition(StateTransition::at(service.id, Utc::now() - Duration::minutes(3), false))
            .await
            .unwrap();
        let report = status
            .record_report(NewReport {
                service_id: service.id,
                issuer_id: "staff-7".to_string(),
                content: "wifi auth failing".to_string(),
                claimed_online: false,
            })
            .await
            .unwrap();

        assert_eq!(status.open_reports(service.id).await.unwrap().len(), 1);
        assert!(status.outage_cache().is_cached(service.id).await);

        let report_id = report.id.unwrap();
        assert!(status.resolve_report(service.id, report_id).await.unwrap());
        assert!(!status.outage_cache().is_cached(service.id).await);
        assert!(!status.resolve_report(service.id, report_id + 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_uptime_report_fields() {
        let (_store, status, service) = status_with_service().await;
        let start = Utc::now() - Duration::seconds(400);
        status
            .record_transition(StateTransition::at(service.id, start, true))
            .await
            .unwrap();
        status
            .record_transition(StateTransition::at(service.id, start + Duration::seconds(100), false))
            .await
            .unwrap();

        let report = status
            .uptime_report_at(service.id, start + Duration::seconds(400))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.total_seconds, 400);
        assert_eq!(report.online_seconds, 100);
        assert_eq!(report.ratio, 0.25);
        assert!(!report.is_online);
    }
}
