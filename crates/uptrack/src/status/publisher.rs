use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::service::StatusService;
use crate::Result;
use crate::monitoring::{Publisher, UpdateBatch};

/// Publishes cycle batches by recording each transition in the log
pub struct StateLogPublisher {
    status: Arc<StatusService>,
}

impl StateLogPublisher {
    pub fn new(status: Arc<StatusService>) -> Self {
        Self { status }
    }
}

#[async_trait]
impl Publisher for StateLogPublisher {
    async fn publish_transitions(&self, batch: &UpdateBatch) -> Result<()> {
        let mut rejected = 0usize;
        for transition in batch {
            if let Err(e) = self.status.record_transition(*transition).await {
                warn!(service = %transition.service_id, "Transition not recorded: {}", e);
                rejected += 1;
            }
        }

        if rejected > 0 {
            return Err(anyhow!("{} of {} transitions were not recorded", rejected, batch.len()));
        }
        Ok(())
    }
}
