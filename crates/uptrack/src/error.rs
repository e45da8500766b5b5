use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ServiceId;

/// Errors surfaced by the status write and read paths
#[derive(Debug, Error)]
pub enum StatusError {
    /// The new transition repeats the latest recorded state
    #[error("service {service_id} is already {}; transition rejected", state_label(.is_online))]
    UnchangedState { service_id: ServiceId, is_online: bool },

    #[error("transition for service {service_id} at {timestamp} is older than the latest one at {latest}")]
    OutOfOrder {
        service_id: ServiceId,
        timestamp: DateTime<Utc>,
        latest: DateTime<Utc>,
    },

    #[error("unknown service {0}")]
    UnknownService(ServiceId),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

fn state_label(is_online: &bool) -> &'static str {
    if *is_online { "online" } else { "offline" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_unchanged_state_message() {
        let id = Uuid::nil();
        let err = StatusError::UnchangedState { service_id: id, is_online: false };
        assert_eq!(
            err.to_string(),
            "service 00000000-0000-0000-0000-000000000000 is already offline; transition rejected"
        );
    }
}
