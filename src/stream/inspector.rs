//! Stream orchestrator for schema discovery
//!
//! Reads the streams of one stream set in order, feeds their records through the stats
//! stage and finalizes the discovered schemas. Streams are never read concurrently, so
//! the inspect and count ceilings apply to the stream set as a whole.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use crate::inference::{
    ContentLabelDetector, InspectionConfig, NoopContentLabelDetector, ProgressDirective,
    StatsOutcome, StatsStage, finalize_schemas,
};
use crate::models::{CountPrecision, RecordContext, Schema};

use super::error::{StreamError, StreamResult};
use super::pipeline::StagePipeline;
use super::progress::{InspectProgress, StreamStats};
use super::source::{OpenedStream, StreamSetPreview, StreamSummary};

/// Why an inspection run stopped reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalizeReason {
    /// Every stream of the set was read to the end
    SourceExhausted,
    /// The count ceiling was reached; remaining records were discarded
    CeilingReached,
}

/// Outcome of a discovery run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionResult {
    pub run_id: Uuid,
    pub schemas: Vec<Schema>,
    pub stream_stats: StreamStats,
    pub finalize_reason: FinalizeReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InspectorState {
    AwaitingNextStream,
    Streaming,
    Finalized,
}

enum StreamEnd {
    Exhausted,
    Ceiling,
}

/// Discover the schemas of a stream set
///
/// Runs until every stream was read or `config.max_count_records` records were counted.
/// Errors from sources and transforms abort the run, except errors raised while flushing
/// a stream that was cut short by the ceiling.
pub async fn inspect(
    preview: &mut StreamSetPreview,
    progress: &mut dyn InspectProgress,
    config: &InspectionConfig,
) -> StreamResult<InspectionResult> {
    inspect_with_detector(preview, progress, config, Box::new(NoopContentLabelDetector)).await
}

/// Same as [`inspect`], with a content label detector fed every inspected value
pub async fn inspect_with_detector(
    preview: &mut StreamSetPreview,
    progress: &mut dyn InspectProgress,
    config: &InspectionConfig,
    detector: Box<dyn ContentLabelDetector>,
) -> StreamResult<InspectionResult> {
    let run_id = Uuid::new_v4();
    let span = info_span!("inspect", stream_set = %preview.slug, %run_id);

    async move {
        info!(
            max_inspect = config.max_inspect_records,
            max_count = config.max_count_records,
            "Starting inspection"
        );

        let mut inspector = Inspector::new(run_id, preview, progress, config, detector);
        match inspector.run().await {
            Ok(reason) => Ok(inspector.finalize(reason)),
            Err(e) => {
                error!(error = %e, "Inspection failed");
                inspector.progress.on_error(&e);
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

struct Inspector<'a> {
    run_id: Uuid,
    preview: &'a mut StreamSetPreview,
    progress: &'a mut dyn InspectProgress,
    config: &'a InspectionConfig,
    stage: StatsStage,
    state: InspectorState,
    stats: StreamStats,
    cursor: usize,
    started: Instant,
    sum_record_hints: bool,
    sum_byte_hints: bool,
}

impl<'a> Inspector<'a> {
    fn new(
        run_id: Uuid,
        preview: &'a mut StreamSetPreview,
        progress: &'a mut dyn InspectProgress,
        config: &'a InspectionConfig,
        detector: Box<dyn ContentLabelDetector>,
    ) -> Self {
        let mut stats = StreamStats::new(preview.slug.as_str());
        stats.expected_streams = preview.expected_stream_count().map(|n| n as u64);
        stats.expected_record_count = preview.expected_record_count;
        stats.expected_total_raw_bytes = preview.expected_total_raw_bytes;

        Self {
            run_id,
            sum_record_hints: preview.expected_record_count.is_none(),
            sum_byte_hints: preview.expected_total_raw_bytes.is_none(),
            preview,
            progress,
            config,
            stage: StatsStage::with_detector(config, detector),
            state: InspectorState::AwaitingNextStream,
            stats,
            cursor: 0,
            started: Instant::now(),
        }
    }

    async fn run(&mut self) -> StreamResult<FinalizeReason> {
        // The ticker lives for this run only and is dropped on every exit path.
        let mut ticker = interval(Duration::from_millis(self.config.progress_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            self.transition(InspectorState::AwaitingNextStream);
            let summary = self
                .preview
                .next_summary(&mut self.cursor)
                .await
                .map_err(|e| StreamError::enumeration_failure(self.preview.slug.as_str(), e))?;

            let Some(summary) = summary else {
                return Ok(FinalizeReason::SourceExhausted);
            };

            if let StreamEnd::Ceiling = self.read_stream(summary, &mut ticker).await? {
                return Ok(FinalizeReason::CeilingReached);
            }
        }
    }

    async fn read_stream(
        &mut self,
        summary: Arc<dyn StreamSummary>,
        ticker: &mut Interval,
    ) -> StreamResult<StreamEnd> {
        let name = summary.name().to_string();
        self.transition(InspectorState::Streaming);
        self.stats.current_stream = Some(name.clone());
        self.progress.on_start(&name);

        let OpenedStream {
            mut stream,
            transforms,
            expected_record_count,
            expected_total_raw_bytes,
        } = summary
            .open_stream(None)
            .await
            .map_err(|e| StreamError::source_failure(name.as_str(), e))?;

        if self.sum_record_hints {
            add_hint(
                &mut self.stats.expected_record_count,
                expected_record_count.or(summary.expected_record_count()),
            );
        }
        if self.sum_byte_hints {
            add_hint(
                &mut self.stats.expected_total_raw_bytes,
                expected_total_raw_bytes.or(summary.expected_total_raw_bytes()),
            );
        }
        info!(stream = %name, transforms = transforms.len(), "Inspecting stream");

        let mut pipeline = StagePipeline::new(name.as_str(), transforms, self.config.batch_size);
        let bytes_before = self.stats.bytes_processed;

        loop {
            tokio::select! {
                next = stream.next() => {
                    let Some(chunk) = next else { break };
                    let chunk = chunk.map_err(|e| StreamError::source_failure(name.as_str(), e))?;
                    let batches = pipeline.push(chunk).await?;
                    self.stats.bytes_processed = bytes_before + pipeline.bytes_read();

                    if self.process(&batches)? == StatsOutcome::Ended {
                        // Parsers may fail when cut off mid-input.
                        if let Err(e) = pipeline.finish().await {
                            debug!(
                                stream = %name,
                                error = %e,
                                "Ignoring flush error after count ceiling"
                            );
                        }
                        info!(
                            stream = %name,
                            records = self.stats.records_counted,
                            "Count ceiling reached"
                        );
                        return Ok(StreamEnd::Ceiling);
                    }
                }
                _ = ticker.tick() => self.report_progress(),
            }
        }

        let batches = pipeline.finish().await?;
        self.stats.bytes_processed = bytes_before + pipeline.bytes_read();
        if self.process(&batches)? == StatsOutcome::Ended {
            info!(stream = %name, records = self.stats.records_counted, "Count ceiling reached");
            return Ok(StreamEnd::Ceiling);
        }

        self.stats.streams_completed += 1;
        debug!(
            stream = %name,
            bytes = pipeline.bytes_read(),
            records = self.stats.records_counted,
            "Stream exhausted"
        );
        Ok(StreamEnd::Exhausted)
    }

    /// Feed batches to the stats stage, deciding per record between inspect, count and end
    fn process(&mut self, batches: &[Vec<RecordContext>]) -> StreamResult<StatsOutcome> {
        let max_inspect = self.config.max_inspect_records;
        let max_count = self.config.max_count_records;
        let stats = &mut self.stats;

        for batch in batches {
            let outcome = self.stage.process_batch(batch, |_| {
                let next = stats.records_counted + 1;
                if next > max_count {
                    return ProgressDirective::End;
                }
                stats.records_counted = next;
                if next > max_inspect {
                    stats.inspecting = false;
                    ProgressDirective::Count
                } else {
                    stats.records_inspected = next;
                    ProgressDirective::Inspect
                }
            })?;

            if outcome == StatsOutcome::Ended {
                return Ok(StatsOutcome::Ended);
            }
        }
        Ok(StatsOutcome::Continue)
    }

    fn report_progress(&mut self) {
        self.stats.update_rate(self.started.elapsed().as_secs_f64());
        self.progress.on_progress(&self.stats);
    }

    fn transition(&mut self, next: InspectorState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Inspector state");
            self.state = next;
        }
    }

    fn finalize(mut self, reason: FinalizeReason) -> InspectionResult {
        self.transition(InspectorState::Finalized);

        let precision = match reason {
            FinalizeReason::SourceExhausted => CountPrecision::Exact,
            FinalizeReason::CeilingReached => CountPrecision::GreaterThan,
        };
        self.stats.current_stream = None;
        self.stats.record_count_precision = precision;
        self.stats.update_rate(self.started.elapsed().as_secs_f64());
        self.stats.estimated_total_records = self.stats.estimate_total();

        let (schemas, detector) = self.stage.into_parts();
        let schemas = finalize_schemas(schemas, precision, detector.as_ref(), self.config);

        self.progress.on_complete(&self.stats);
        info!(
            schemas = schemas.len(),
            records = self.stats.records_counted,
            inspected = self.stats.records_inspected,
            streams = self.stats.streams_completed,
            reason = ?reason,
            "Inspection finished"
        );

        InspectionResult {
            run_id: self.run_id,
            schemas,
            stream_stats: self.stats,
            finalize_reason: reason,
        }
    }
}

fn add_hint(total: &mut Option<u64>, hint: Option<u64>) {
    if let Some(hint) = hint {
        *total.get_or_insert(0) += hint;
    }
}
