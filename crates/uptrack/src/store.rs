//! Collaborator contracts for the catalog and the durable stores.
//!
//! The engine never owns persistence; it reads the catalog and the transition
//! log through these traits and treats everything it caches as derived.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;
use crate::model::{OfflineReport, Service, ServiceId, StateTransition};

/// Catalog of tracked services
#[async_trait]
pub trait Catalog: Send + Sync {
    /// All services that should currently be inspected
    async fn list_tracked_services(&self) -> Result<Vec<Service>>;

    /// Look up one service; `None` when the catalog does not know it
    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>>;
}

/// Append-only log of state transitions
#[async_trait]
pub trait TransitionLog: Send + Sync {
    /// Full history of a service, ascending by timestamp
    async fn history(&self, service_id: ServiceId) -> Result<Vec<StateTransition>>;

    /// Chronologically latest transition of a service
    async fn last_transition(&self, service_id: ServiceId) -> Result<Option<StateTransition>>;

    async fn append(&self, transition: &StateTransition) -> Result<()>;
}

/// Store of user-submitted reports
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist a report and return its identifier
    async fn insert_report(&self, report: &OfflineReport) -> Result<i64>;

    /// Reports claiming the service offline, created at or after `since`,
    /// ascending by creation time
    ///
    /// Reports claiming "online" are excluded: inside an outage window they
    /// contradict the offline state and are never auto-solved, so they are
    /// also never appended to a cached window. Filtering here keeps a freshly
    /// loaded window identical to one built up incrementally.
    async fn reports_since(
        &self,
        service_id: ServiceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<OfflineReport>>;

    /// Mark a report solved; `false` when no such report exists for the service
    async fn mark_solved(&self, service_id: ServiceId, report_id: i64) -> Result<bool>;
}
