use async_trait::async_trait;

use super::aggregator::UpdateBatch;
use crate::Result;

/// Downstream consumer of each non-empty cycle batch
///
/// Delivery is at-most-once: the scheduler never retries a failed publish.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish_transitions(&self, batch: &UpdateBatch) -> Result<()>;
}
