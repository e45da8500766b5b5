//! Uptime derivation over the transition log.
//!
//! A summary holds the closed intervals between recorded transitions plus the
//! transition that opened the current interval. Reads close that interval
//! with a synthetic boundary at the query time, so a cached summary answers
//! without scanning history and stays equal to a cold recompute.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::slots::{KeyedSlots, Slot};
use crate::Result;
use crate::model::{ServiceId, StateTransition};
use crate::store::TransitionLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UptimeSummary {
    pub service_id: ServiceId,
    pub total_seconds: i64,
    pub online_seconds: i64,
    latest: StateTransition,
}

impl UptimeSummary {
    /// Summarize an ascending history; `None` when it is empty
    pub fn from_history(history: &[StateTransition]) -> Option<Self> {
        let (first, rest) = history.split_first()?;
        let mut summary = Self {
            service_id: first.service_id,
            total_seconds: 0,
            online_seconds: 0,
            latest: *first,
        };
        for transition in rest {
            summary.advance(transition);
        }
        Some(summary)
    }

    /// Account for the interval ending at `next`, which becomes the latest entry
    pub fn advance(&mut self, next: &StateTransition) {
        let elapsed = self.latest.seconds_until(next.timestamp);
        self.total_seconds += elapsed;
        if self.latest.is_online {
            self.online_seconds += elapsed;
        }
        self.latest = *next;
    }

    /// Summary with the open interval closed by a synthetic entry at `now`
    pub fn closed_at(&self, now: DateTime<Utc>) -> Self {
        let mut closed = *self;
        // only the boundary's timestamp is consulted
        closed.advance(&StateTransition::at(self.service_id, now, self.latest.is_online));
        closed
    }

    /// Online share rounded to two decimals
    ///
    /// An empty span reports the current state: 1.0 online, 0.0 offline.
    pub fn ratio(&self) -> f64 {
        if self.total_seconds == 0 {
            return if self.latest.is_online { 1.0 } else { 0.0 };
        }
        round_ratio(self.online_seconds as f64 / self.total_seconds as f64)
    }

    /// Transition that opened the still-running interval
    pub fn latest(&self) -> &StateTransition {
        &self.latest
    }
}

pub fn round_ratio(ratio: f64) -> f64 {
    (ratio * 100.0).round() / 100.0
}

/// Full recompute of the uptime ratio at `now`
pub fn uptime_ratio(history: &[StateTransition], now: DateTime<Utc>) -> Option<f64> {
    UptimeSummary::from_history(history).map(|summary| summary.closed_at(now).ratio())
}

/// Process-local cache of uptime summaries, one slot per service
pub struct UptimeCache {
    slots: KeyedSlots<UptimeSummary>,
}

impl Default for UptimeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl UptimeCache {
    pub fn new() -> Self {
        Self { slots: KeyedSlots::new() }
    }

    /// Cached summary, computed from the full history on a miss
    ///
    /// The slot lock is held across the history scan so concurrent readers of
    /// the same service wait for one recompute.
    pub async fn summary(
        &self,
        log: &dyn TransitionLog,
        service_id: ServiceId,
    ) -> Result<Option<UptimeSummary>> {
        let slot = self.slots.get_or_create(service_id).await;
        let mut cached = slot.lock().await;
        if let Some(summary) = *cached {
            return Ok(Some(summary));
        }

        let history = log.history(service_id).await?;
        let summary = UptimeSummary::from_history(&history);
        debug!(service = %service_id, transitions = history.len(), "Recomputed uptime summary");
        *cached = summary;
        Ok(summary)
    }

    /// Slot the write path locks while appending to the log
    pub(crate) async fn slot(&self, service_id: ServiceId) -> Slot<UptimeSummary> {
        self.slots.get_or_create(service_id).await
    }

    pub async fn is_cached(&self, service_id: ServiceId) -> bool {
        match self.slots.existing(service_id).await {
            Some(slot) => slot.lock().await.is_some(),
            None => false,
        }
    }

    /// Drop every summary; they are rebuilt lazily
    pub async fn clear(&self) {
        self.slots.clear().await;
    }
}
