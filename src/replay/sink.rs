//! Sink interface and the driver that drains a replay into it

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{Instrument, error, info, info_span};

use crate::models::SinkState;
use crate::stream::{StreamError, StreamResult};

use super::pipeline::{ReplayBatch, ReplayStream};

/// Destination of replayed records
#[async_trait]
pub trait RecordSink: Send {
    /// Persist one batch
    async fn write_batch(&mut self, batch: &ReplayBatch) -> anyhow::Result<()>;

    /// Make everything written so far durable
    async fn commit(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Outcome of [`write_replay`]
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSummary {
    pub records_written: u64,
    pub batches_written: u64,
    /// State to save for the next replay into the same sink
    pub state: SinkState,
}

/// Drain a replay into a sink and compute the sink state to save afterwards
///
/// The state is derived from `previous` and returned only once the sink committed, so a
/// replay that fails midway leaves the saved state untouched. A full-set replay discards
/// the stream set's previous state first.
pub async fn write_replay(
    mut stream: ReplayStream,
    sink: &mut dyn RecordSink,
    previous: Option<SinkState>,
    package_version: &str,
) -> StreamResult<WriteSummary> {
    let slug = stream.stream_set_slug().to_string();
    let span = info_span!("write_replay", stream_set = %slug, method = %stream.update_method());

    async move {
        let mut state = previous.unwrap_or_else(|| SinkState::new(package_version));
        state.package_version = package_version.to_string();
        if !stream.update_method().is_append() {
            state.stream_sets.remove(&slug);
        }

        let mut records_written = 0u64;
        let mut batches_written = 0u64;

        while let Some(batch) = stream.next().await {
            let batch = batch.inspect_err(|e| error!(error = %e, "Replay aborted"))?;
            sink.write_batch(&batch)
                .await
                .map_err(StreamError::sink_failure)
                .inspect_err(|e| error!(error = %e, "Sink rejected batch"))?;

            let stream_state = state.stream_state_mut(&batch.stream_set_slug, &batch.stream_name);
            for record in &batch.records {
                if let Some(offset) = record.offset {
                    stream_state.record_offset(&record.schema_slug, offset);
                }
            }
            stream_state.update_hash = batch.update_hash.clone();

            records_written += batch.records.len() as u64;
            batches_written += 1;
        }

        sink.commit().await.map_err(StreamError::sink_failure)?;

        state.stream_sets.entry(slug.clone()).or_default().update_hash =
            stream.stream_set_update_hash().map(str::to_string);
        state.touch();

        info!(records = records_written, batches = batches_written, "Replay written");
        Ok(WriteSummary {
            records_written,
            batches_written,
            state,
        })
    }
    .instrument(span)
    .await
}
