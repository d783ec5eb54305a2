use async_trait::async_trait;

use crate::core::StateService;
use crate::error::SinkError;
use crate::events::EventBatch;

/// Destination of producer flushes.
///
/// Implementations must be `Send + Sync` and cheap to share behind an `Arc`.
///
/// ### Error semantics
/// - [`SinkError::Unavailable`]: the batch is put back into the producer's
///   buffer and resent after a backoff delay.
/// - [`SinkError::Rejected`]: the batch is discarded and its events are
///   counted as dropped.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Delivers one batch.
    async fn send_batch(&self, batch: &EventBatch) -> Result<(), SinkError>;

    /// Returns a stable, human-readable sink name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// In-process delivery straight into a service.
#[async_trait]
impl EventSink for StateService {
    async fn send_batch(&self, batch: &EventBatch) -> Result<(), SinkError> {
        self.ingest(batch).map(|_| ()).map_err(SinkError::from)
    }

    fn name(&self) -> &'static str {
        "state-service"
    }
}
