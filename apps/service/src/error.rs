use std::io::Error as IoError;

use thiserror::Error;
use uptrack::StatusError;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Database error: {0:#}")]
    Database(#[from] anyhow::Error),
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error("Unknown service {0}")]
    UnknownService(uuid::Uuid),
    #[error("Service {service} has no report #{report}")]
    UnknownReport { service: uuid::Uuid, report: i64 },
}
