//! Batching and delivery of translated time series.

pub mod stackdriver;

use std::sync::Arc;

use error_stack::Report;

use crate::errors::DeliveryError;
use crate::model::TimeSeriesPoint;

pub use stackdriver::StackdriverWriter;

/// Backend limit on time series per write call.
pub const MAX_TIMESERIES_PER_REQUEST: usize = 200;

/// Trait for the backend write call
#[async_trait::async_trait]
pub trait MetricWriter: Send + Sync {
    async fn write(&self, batch: &[TimeSeriesPoint]) -> Result<(), Report<DeliveryError>>;
}

/// Outcome of delivering one cycle's points.
#[derive(Debug, Default)]
pub struct SendReport {
    /// Write calls issued.
    pub batches: usize,
    pub points_sent: usize,
    /// One entry per failed batch, in batch order.
    pub failures: Vec<Report<DeliveryError>>,
}

impl SendReport {
    pub fn points_dropped(&self) -> usize {
        self.failures
            .iter()
            .map(|f| f.current_context().points())
            .sum()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Splits points into backend sized chunks and writes them one after another.
pub struct BatchSender {
    writer: Arc<dyn MetricWriter>,
    max_batch_size: usize,
}

impl BatchSender {
    pub fn new(writer: Arc<dyn MetricWriter>, max_batch_size: usize) -> Self {
        Self {
            writer,
            max_batch_size: max_batch_size.clamp(1, MAX_TIMESERIES_PER_REQUEST),
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Writes every chunk sequentially. A failed chunk is recorded and
    /// dropped without retry; the remaining chunks are still attempted.
    pub async fn send(&self, points: &[TimeSeriesPoint]) -> SendReport {
        let mut report = SendReport::default();

        for (index, chunk) in points.chunks(self.max_batch_size).enumerate() {
            report.batches += 1;
            match self.writer.write(chunk).await {
                Ok(()) => report.points_sent += chunk.len(),
                Err(e) => {
                    tracing::debug!(batch = index, points = chunk.len(), "batch write failed");
                    report.failures.push(e);
                }
            }
        }

        report
    }
}
