//! Uptrack - service health monitoring engine
//!
//! This library schedules periodic probes against a catalog of services,
//! aggregates the resulting online/offline transitions per cycle, and derives
//! uptime ratios and open-outage report windows from the transition log.

pub mod error;
pub mod memory;
pub mod model;
pub mod monitoring;
pub mod status;
pub mod store;

pub use error::StatusError;
pub use memory::MemoryStore;
pub use model::{CheckKind, NewReport, OfflineReport, Service, ServiceId, StateTransition};
pub use monitoring::{
    CycleOutcome, DefaultProbeFactory, InspectionScheduler, Inspector, Probe, ProbeFactory,
    Publisher, SchedulerConfig, UpdateAggregator, UpdateBatch,
};
pub use status::{StateLogPublisher, StatusService, UptimeReport};
pub use store::{Catalog, ReportStore, TransitionLog};

/// Result type for collaborator calls
pub type Result<T> = anyhow::Result<T>;
