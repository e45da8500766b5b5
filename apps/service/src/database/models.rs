//! Row mapping between libsql and the engine's model types.
//!
//! Timestamps are stored as Unix milliseconds, booleans as 0/1 integers.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use libsql::Row;
use uptrack::{OfflineReport, Service, StateTransition};
use uuid::Uuid;

pub const SERVICE_COLUMNS: &str = "id, name, target, kind, university";
pub const TRANSITION_COLUMNS: &str = "service_id, timestamp, is_online";
pub const REPORT_COLUMNS: &str =
    "id, service_id, issuer_id, content, claimed_online, is_solved, created_at";

pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub fn i64_to_timestamp(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| anyhow!("Timestamp out of range: {}", millis))
}

pub fn bool_to_i64(value: bool) -> i64 {
    if value { 1 } else { 0 }
}

fn parse_uuid(row: &Row, idx: i32) -> Result<Uuid> {
    let raw: String = row.get(idx)?;
    Ok(Uuid::parse_str(&raw)?)
}

pub fn service_from_row(row: &Row) -> Result<Service> {
    let kind: String = row.get(3)?;
    Ok(Service {
        id: parse_uuid(row, 0)?,
        name: row.get(1)?,
        target: row.get(2)?,
        kind: kind.parse()?,
        university: row.get(4)?,
    })
}

pub fn transition_from_row(row: &Row) -> Result<StateTransition> {
    Ok(StateTransition {
        service_id: parse_uuid(row, 0)?,
        timestamp: i64_to_timestamp(row.get(1)?)?,
        is_online: row.get::<i64>(2)? != 0,
    })
}

pub fn report_from_row(row: &Row) -> Result<OfflineReport> {
    Ok(OfflineReport {
        id: Some(row.get(0)?),
        service_id: parse_uuid(row, 1)?,
        issuer_id: row.get(2)?,
        content: row.get(3)?,
        claimed_online: row.get::<i64>(4)? != 0,
        is_solved: row.get::<i64>(5)? != 0,
        created_at: i64_to_timestamp(row.get(6)?)?,
    })
}
