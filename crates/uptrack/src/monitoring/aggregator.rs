use tokio::sync::Mutex;
use tracing::warn;

use crate::model::{ServiceId, StateTransition};

#[derive(Default)]
struct Pending {
    transitions: Vec<StateTransition>,
    sealed: bool,
}

/// Per-cycle sink for transitions reported by concurrent inspections
///
/// Appends are serialized by a lock. `build_update` seals the aggregator;
/// anything recorded afterwards is refused.
#[derive(Default)]
pub struct UpdateAggregator {
    pending: Mutex<Pending>,
}

impl UpdateAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one transition; returns `false` if the cycle was already sealed
    pub async fn record(&self, transition: StateTransition) -> bool {
        let mut pending = self.pending.lock().await;
        if pending.sealed {
            warn!(service = %transition.service_id, "Transition arrived after the cycle was sealed");
            return false;
        }
        pending.transitions.push(transition);
        true
    }

    /// Freeze everything recorded so far into the cycle's batch
    pub async fn build_update(&self) -> UpdateBatch {
        let mut pending = self.pending.lock().await;
        pending.sealed = true;
        UpdateBatch { transitions: std::mem::take(&mut pending.transitions) }
    }
}

/// Immutable set of transitions produced by one cycle, in completion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateBatch {
    transitions: Vec<StateTransition>,
}

impl UpdateBatch {
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StateTransition> {
        self.transitions.iter()
    }

    pub fn service_ids(&self) -> impl Iterator<Item = ServiceId> + '_ {
        self.transitions.iter().map(|t| t.service_id)
    }
}

impl<'a> IntoIterator for &'a UpdateBatch {
    type Item = &'a StateTransition;
    type IntoIter = std::slice::Iter<'a, StateTransition>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl From<Vec<StateTransition>> for UpdateBatch {
    fn from(transitions: Vec<StateTransition>) -> Self {
        Self { transitions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_not_lost() {
        let aggregator = Arc::new(UpdateAggregator::new());
        let mut handles = Vec::new();
        for _ in 0..64 {
            let aggregator = aggregator.clone();
            handles.push(tokio::spawn(async move {
                aggregator.record(StateTransition::new(Uuid::new_v4(), true)).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let batch = aggregator.build_update().await;
        assert_eq!(batch.len(), 64);
        let distinct: HashSet<_> = batch.service_ids().collect();
        assert_eq!(distinct.len(), 64);
    }

    #[tokio::test]
    async fn test_sealed_aggregator_refuses_late_transitions() {
        let aggregator = UpdateAggregator::new();
        assert!(aggregator.record(StateTransition::new(Uuid::new_v4(), false)).await);

        let batch = aggregator.build_update().await;
        assert!(!aggregator.record(StateTransition::new(Uuid::new_v4(), true)).await);
        assert_eq!(batch.len(), 1);
        assert!(aggregator.build_update().await.is_empty());
    }
}
