use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;
use uptrack::{
    Catalog, OfflineReport, ReportStore, Service, ServiceId, StateTransition, TransitionLog,
};

use super::models::{
    REPORT_COLUMNS, SERVICE_COLUMNS, TRANSITION_COLUMNS, bool_to_i64, report_from_row,
    service_from_row, timestamp_to_i64, transition_from_row,
};
use crate::pool::{LibsqlManager, LibsqlPool};

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    /// Insert a service or update the existing entry with the same id
    pub async fn save_service(&self, service: &Service) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO services (id, name, target, kind, university, tracked, created_at) VALUES (?, ?, ?, ?, ?, 1, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, target = excluded.target, kind = excluded.kind, university = excluded.university",
            params![
                service.id.to_string(),
                service.name.clone(),
                service.target.clone(),
                service.kind.to_string(),
                service.university.clone(),
                timestamp_to_i64(Utc::now())
            ],
        )
        .await?;
        Ok(())
    }

    /// Stop or resume tracking a service; returns whether it exists
    pub async fn set_tracked(&self, id: ServiceId, tracked: bool) -> Result<bool> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE services SET tracked = ? WHERE id = ?",
                params![bool_to_i64(tracked), id.to_string()],
            )
            .await?;
        Ok(changed > 0)
    }
}

#[async_trait]
impl Catalog for DatabaseImpl {
    async fn list_tracked_services(&self) -> Result<Vec<Service>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {SERVICE_COLUMNS} FROM services WHERE tracked = 1 ORDER BY name"),
                (),
            )
            .await?;

        let mut services = Vec::new();
        while let Some(row) = rows.next().await? {
            services.push(service_from_row(&row)?);
        }
        Ok(services)
    }

    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?"),
                params![id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(service_from_row(&row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TransitionLog for DatabaseImpl {
    async fn history(&self, service_id: ServiceId) -> Result<Vec<StateTransition>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {TRANSITION_COLUMNS} FROM state_transitions WHERE service_id = ? ORDER BY timestamp ASC, id ASC"
                ),
                params![service_id.to_string()],
            )
            .await?;

        let mut history = Vec::new();
        while let Some(row) = rows.next().await? {
            history.push(transition_from_row(&row)?);
        }
        Ok(history)
    }

    async fn last_transition(&self, service_id: ServiceId) -> Result<Option<StateTransition>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {TRANSITION_COLUMNS} FROM state_transitions WHERE service_id = ? ORDER BY timestamp DESC, id DESC LIMIT 1"
                ),
                params![service_id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(transition_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn append(&self, transition: &StateTransition) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO state_transitions (service_id, timestamp, is_online) VALUES (?, ?, ?)",
            params![
                transition.service_id.to_string(),
                timestamp_to_i64(transition.timestamp),
                bool_to_i64(transition.is_online)
            ],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ReportStore for DatabaseImpl {
    async fn insert_report(&self, report: &OfflineReport) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO offline_reports (service_id, issuer_id, content, claimed_online, is_solved, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                report.service_id.to_string(),
                report.issuer_id.clone(),
                report.content.clone(),
                bool_to_i64(report.claimed_online),
                bool_to_i64(report.is_solved),
                timestamp_to_i64(report.created_at)
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn reports_since(
        &self,
        service_id: ServiceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<OfflineReport>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {REPORT_COLUMNS} FROM offline_reports WHERE service_id = ? AND claimed_online = 0 AND created_at >= ? ORDER BY created_at ASC, id ASC"
                ),
                params![service_id.to_string(), timestamp_to_i64(since)],
            )
            .await?;

        let mut reports = Vec::new();
        while let Some(row) = rows.next().await? {
            reports.push(report_from_row(&row)?);
        }
        Ok(reports)
    }

    async fn mark_solved(&self, service_id: ServiceId, report_id: i64) -> Result<bool> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE offline_reports SET is_solved = 1 WHERE id = ? AND service_id = ?",
                params![report_id, service_id.to_string()],
            )
            .await?;
        Ok(changed > 0)
    }
}
