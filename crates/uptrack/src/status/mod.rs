//! Derived read models over the transition log: uptime summaries and open
//! outage windows, plus the write path that keeps them consistent.

pub mod outage;
pub mod publisher;
pub mod service;
mod slots;
pub mod uptime;

pub use outage::{OutageWindow, OutageWindowCache};
pub use publisher::StateLogPublisher;
pub use service::{StatusService, UptimeReport};
pub use uptime::{UptimeCache, UptimeSummary, round_ratio, uptime_ratio};
