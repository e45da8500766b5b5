use chrono::{DateTime, Utc};
use tracing::debug;

use super::slots::{KeyedSlots, Slot};
use crate::Result;
use crate::model::{NewReport, OfflineReport, ServiceId};
use crate::store::{ReportStore, TransitionLog};

/// Reports raised since a service went offline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutageWindow {
    pub started_at: DateTime<Utc>,
    pub reports: Vec<OfflineReport>,
}

/// Per-service cache of the currently open outage window
///
/// A window only exists while the service stays in the offline interval it
/// was computed for; every recorded transition drops it.
pub struct OutageWindowCache {
    slots: KeyedSlots<OutageWindow>,
}

impl Default for OutageWindowCache {
    fn default() -> Self {
        Self::new()
    }
}

impl OutageWindowCache {
    pub fn new() -> Self {
        Self { slots: KeyedSlots::new() }
    }

    /// Reports of the open outage, empty when the service is online or unobserved
    pub async fn open_reports(
        &self,
        log: &dyn TransitionLog,
        reports: &dyn ReportStore,
        service_id: ServiceId,
    ) -> Result<Vec<OfflineReport>> {
        let slot = self.slots.get_or_create(service_id).await;
        let mut cached = slot.lock().await;
        if let Some(window) = cached.as_ref() {
            return Ok(window.reports.clone());
        }

        let started_at = match log.last_transition(service_id).await? {
            Some(latest) if !latest.is_online => latest.timestamp,
            _ => return Ok(Vec::new()),
        };

        let window_reports = reports.reports_since(service_id, started_at).await?;
        debug!(
            service = %service_id,
            reports = window_reports.len(),
            "Loaded outage window since {}",
            started_at
        );
        *cached = Some(OutageWindow { started_at, reports: window_reports.clone() });
        Ok(window_reports)
    }

    /// Persist a report, solving it on arrival when its claim matches the
    /// latest known state. A solved report joins an already cached window.
    pub async fn record_report(
        &self,
        log: &dyn TransitionLog,
        reports: &dyn ReportStore,
        report: NewReport,
        now: DateTime<Utc>,
    ) -> Result<OfflineReport> {
        let slot = self.slots.get_or_create(report.service_id).await;
        let mut cached = slot.lock().await;

        let latest = log.last_transition(report.service_id).await?;
        let mut stored = OfflineReport::from_new(report, latest.map(|t| t.is_online), now);
        stored.id = Some(reports.insert_report(&stored).await?);

        if stored.is_solved {
            if let Some(window) = cached.as_mut() {
                window.reports.push(stored.clone());
            }
        }
        Ok(stored)
    }

    pub(crate) async fn slot(&self, service_id: ServiceId) -> Slot<OutageWindow> {
        self.slots.get_or_create(service_id).await
    }

    /// Forget the cached window of a service
    pub async fn invalidate(&self, service_id: ServiceId) {
        if let Some(slot) = self.slots.existing(service_id).await {
            *slot.lock().await = None;
        }
    }

    pub async fn is_cached(&self, service_id: ServiceId) -> bool {
        match self.slots.existing(service_id).await {
            Some(slot) => slot.lock().await.is_some(),
            None => false,
        }
    }

    pub async fn clear(&self) {
        self.slots.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::model::StateTransition;
    use chrono::Duration;
    use uuid::Uuid;

    fn report(service_id: ServiceId, claimed_online: bool) -> NewReport {
        NewReport {
            service_id,
            issuer_id: "issuer".to_string(),
            content: "cannot log in".to_string(),
            claimed_online,
        }
    }

    #[tokio::test]
    async fn test_online_service_has_no_open_window() {
        let store = MemoryStore::new();
        let cache = OutageWindowCache::new();
        let id = Uuid::new_v4();

        assert!(cache.open_reports(&store, &store, id).await.unwrap().is_empty());
        store.append(&StateTransition::new(id, true)).await.unwrap();
        assert!(cache.open_reports(&store, &store, id).await.unwrap().is_empty());
        assert!(!cache.is_cached(id).await);
    }

    #[tokio::test]
    async fn test_window_only_contains_reports_since_going_offline() {
        let store = MemoryStore::new();
        let cache = OutageWindowCache::new();
        let id = Uuid::new_v4();
        let now = Utc::now();

        store
            .append(&StateTransition::at(id, now - Duration::hours(2), true))
            .await
            .unwrap();
        cache
            .record_report(&store, &store, report(id, false), now - Duration::hours(1))
            .await
            .unwrap();
        store
            .append(&StateTransition::at(id, now - Duration::minutes(30), false))
            .await
            .unwrap();
        let inside = cache
            .record_report(&store, &store, report(id, false), now - Duration::minutes(10))
            .await
            .unwrap();

        let open = cache.open_reports(&store, &store, id).await.unwrap();
        assert_eq!(open, vec![inside]);
        assert!(cache.is_cached(id).await);
    }

    #[tokio::test]
    async fn test_solved_report_joins_cached_window() {
        let store = MemoryStore::new();
        let cache = OutageWindowCache::new();
        let id = Uuid::new_v4();
        let now = Utc::now();
        store
            .append(&StateTransition::at(id, now - Duration::minutes(5), false))
            .await
            .unwrap();
        assert!(cache.open_reports(&store, &store, id).await.unwrap().is_empty());

        let solved = cache.record_report(&store, &store, report(id, false), now).await.unwrap();
        assert!(solved.is_solved);
        let open = cache.record_report(&store, &store, report(id, true), now).await.unwrap();
        assert!(!open.is_solved);

        assert_eq!(cache.open_reports(&store, &store, id).await.unwrap(), vec![solved]);
    }
}
