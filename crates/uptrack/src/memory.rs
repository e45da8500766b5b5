//! In-process store implementing every storage contract.
//!
//! Used by the test suites and by embedders that do not need durability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::Result;
use crate::model::{OfflineReport, Service, ServiceId, StateTransition};
use crate::store::{Catalog, ReportStore, TransitionLog};

#[derive(Default)]
pub struct MemoryStore {
    services: RwLock<Vec<Service>>,
    transitions: RwLock<HashMap<ServiceId, Vec<StateTransition>>>,
    reports: RwLock<Vec<OfflineReport>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a catalog entry
    pub async fn upsert_service(&self, service: Service) {
        let mut services = self.services.write().await;
        match services.iter_mut().find(|s| s.id == service.id) {
            Some(existing) => *existing = service,
            None => services.push(service),
        }
    }

    pub async fn remove_service(&self, id: ServiceId) {
        self.services.write().await.retain(|s| s.id != id);
    }

    /// Replace the whole catalog
    pub async fn set_services(&self, services: Vec<Service>) {
        *self.services.write().await = services;
    }

    /// Number of transitions stored for a service
    pub async fn transition_count(&self, service_id: ServiceId) -> usize {
        self.transitions.read().await.get(&service_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn list_tracked_services(&self) -> Result<Vec<Service>> {
        Ok(self.services.read().await.clone())
    }

    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>> {
        Ok(self.services.read().await.iter().find(|s| s.id == id).cloned())
    }
}

#[async_trait]
impl TransitionLog for MemoryStore {
    async fn history(&self, service_id: ServiceId) -> Result<Vec<StateTransition>> {
        Ok(self.transitions.read().await.get(&service_id).cloned().unwrap_or_default())
    }

    async fn last_transition(&self, service_id: ServiceId) -> Result<Option<StateTransition>> {
        Ok(self
            .transitions
            .read()
            .await
            .get(&service_id)
            .and_then(|history| history.last().copied()))
    }

    async fn append(&self, transition: &StateTransition) -> Result<()> {
        let mut transitions = self.transitions.write().await;
        let history = transitions.entry(transition.service_id).or_default();
        // keep ascending order even if a caller appends an equal timestamp
        let position = history.partition_point(|t| t.timestamp <= transition.timestamp);
        history.insert(position, *transition);
        Ok(())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn insert_report(&self, report: &OfflineReport) -> Result<i64> {
        let mut reports = self.reports.write().await;
        let id = reports.len() as i64 + 1;
        let mut stored = report.clone();
        stored.id = Some(id);
        reports.push(stored);
        Ok(id)
    }

    async fn reports_since(
        &self,
        service_id: ServiceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<OfflineReport>> {
        let mut matching: Vec<OfflineReport> = self
            .reports
            .read()
            .await
            .iter()
            .filter(|r| r.service_id == service_id && !r.claimed_online && r.created_at >= since)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.created_at);
        Ok(matching)
    }

    async fn mark_solved(&self, service_id: ServiceId, report_id: i64) -> Result<bool> {
        let mut reports = self.reports.write().await;
        match reports
            .iter_mut()
            .find(|r| r.id == Some(report_id) && r.service_id == service_id)
        {
            Some(report) => {
                report.is_solved = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
