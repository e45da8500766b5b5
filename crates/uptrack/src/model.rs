use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a monitored service in the catalog
pub type ServiceId = Uuid;

/// How a service is probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    #[default]
    Http,
    Tcp,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckKind::Http => write!(f, "http"),
            CheckKind::Tcp => write!(f, "tcp"),
        }
    }
}

impl FromStr for CheckKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" | "https" => Ok(CheckKind::Http),
            "tcp" => Ok(CheckKind::Tcp),
            other => Err(anyhow::anyhow!("Unsupported check kind: {}", other)),
        }
    }
}

/// A tracked service, owned by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    /// URL for HTTP checks, `host:port` for TCP checks
    pub target: String,
    pub kind: CheckKind,
    pub university: Option<String>,
}

impl Service {
    pub fn new(name: impl Into<String>, target: impl Into<String>, kind: CheckKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            target: target.into(),
            kind,
            university: None,
        }
    }

    pub fn with_university(mut self, university: impl Into<String>) -> Self {
        self.university = Some(university.into());
        self
    }
}

/// A recorded change of a service's online state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub service_id: ServiceId,
    pub timestamp: DateTime<Utc>,
    pub is_online: bool,
}

impl StateTransition {
    /// Transition observed now
    pub fn new(service_id: ServiceId, is_online: bool) -> Self {
        Self::at(service_id, Utc::now().trunc_subsecs(3), is_online)
    }

    pub fn at(service_id: ServiceId, timestamp: DateTime<Utc>, is_online: bool) -> Self {
        Self { service_id, timestamp, is_online }
    }

    /// Seconds elapsed from this transition until `later`, never negative
    pub fn seconds_until(&self, later: DateTime<Utc>) -> i64 {
        (later - self.timestamp).num_seconds().max(0)
    }
}

/// A user report about a service's state, before it is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReport {
    pub service_id: ServiceId,
    pub issuer_id: String,
    pub content: String,
    pub claimed_online: bool,
}

/// A persisted user report about a service's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineReport {
    pub id: Option<i64>,
    pub service_id: ServiceId,
    pub issuer_id: String,
    pub content: String,
    pub claimed_online: bool,
    pub is_solved: bool,
    pub created_at: DateTime<Utc>,
}

impl OfflineReport {
    /// Build the persisted form of a report. It is solved on arrival when its
    /// claim already matches the latest known state of the service.
    pub fn from_new(report: NewReport, latest_state: Option<bool>, created_at: DateTime<Utc>) -> Self {
        let is_solved = latest_state == Some(report.claimed_online);
        Self {
            id: None,
            service_id: report.service_id,
            issuer_id: report.issuer_id,
            content: report.content,
            claimed_online: report.claimed_online,
            is_solved,
            created_at,
        }
    }
}
