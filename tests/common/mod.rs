//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use data_discovery_sdk::models::{RecordContext, StreamState};
use data_discovery_sdk::replay::{RecordSink, ReplayBatch};
use data_discovery_sdk::stream::{
    InspectProgress, OpenedStream, StreamChunk, StreamError, StreamStats, StreamSummary,
    StreamTransform,
};
use futures::{StreamExt, stream};

/// Parses CSV text into records of string values; the header row names the fields
///
/// Offsets are row indexes starting at 0. Quoting is not supported.
pub struct CsvTransform {
    schema_slug: String,
    header: Option<Vec<String>>,
    pending: String,
    row: u64,
}

impl CsvTransform {
    pub fn new(schema_slug: &str) -> Self {
        Self {
            schema_slug: schema_slug.to_string(),
            header: None,
            pending: String::new(),
            row: 0,
        }
    }

    fn line(&mut self, line: &str) -> Option<StreamChunk> {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            return None;
        }
        let cells: Vec<&str> = line.split(',').collect();
        if self.header.is_none() {
            self.header = Some(cells.iter().map(|c| c.to_string()).collect());
            return None;
        }
        let header = self.header.as_ref()?;

        let pairs: Vec<(String, String)> = header
            .iter()
            .zip(cells)
            .map(|(h, c)| (h.clone(), c.to_string()))
            .collect();
        let ctx = RecordContext::from_pairs(self.schema_slug.as_str(), pairs).with_offset(self.row);
        self.row += 1;
        Some(StreamChunk::Record(ctx))
    }
}

#[async_trait]
impl StreamTransform for CsvTransform {
    fn name(&self) -> &str {
        "csv"
    }

    async fn transform(&mut self, chunk: StreamChunk) -> anyhow::Result<Vec<StreamChunk>> {
        let StreamChunk::Bytes(bytes) = chunk else {
            return Ok(vec![chunk]);
        };
        self.pending.push_str(std::str::from_utf8(&bytes)?);

        let mut out = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            out.extend(self.line(line.trim_end_matches('\n')));
        }
        Ok(out)
    }

    async fn flush(&mut self) -> anyhow::Result<Vec<StreamChunk>> {
        let rest = std::mem::take(&mut self.pending);
        Ok(self.line(&rest).into_iter().collect())
    }
}

/// Passes chunks through but fails when flushed
pub struct FailingFlush;

#[async_trait]
impl StreamTransform for FailingFlush {
    fn name(&self) -> &str {
        "failing-flush"
    }

    async fn transform(&mut self, chunk: StreamChunk) -> anyhow::Result<Vec<StreamChunk>> {
        Ok(vec![chunk])
    }

    async fn flush(&mut self) -> anyhow::Result<Vec<StreamChunk>> {
        anyhow::bail!("unexpected end of input")
    }
}

enum Content {
    Chunks(Vec<StreamChunk>),
    Csv { schema_slug: String, text: String, chunk_size: usize },
    Repeat { record: RecordContext, count: u64 },
    FailAfter { records: Vec<RecordContext> },
}

/// In-memory stream summary
///
/// Remembers the saved state passed to every `open_stream` call.
pub struct MemoryStreamSummary {
    name: String,
    content: Content,
    update_hash: Option<String>,
    flush_fails: bool,
    pub opened_with: Arc<Mutex<Vec<Option<StreamState>>>>,
}

impl MemoryStreamSummary {
    fn with_content(name: &str, content: Content) -> Self {
        Self {
            name: name.to_string(),
            content,
            update_hash: None,
            flush_fails: false,
            opened_with: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Stream of ready-made records
    pub fn records(name: &str, records: Vec<RecordContext>) -> Self {
        let chunks = records.into_iter().map(StreamChunk::Record).collect();
        Self::with_content(name, Content::Chunks(chunks))
    }

    /// Stream of CSV text split into byte chunks, parsed by [`CsvTransform`]
    pub fn csv(name: &str, schema_slug: &str, text: &str, chunk_size: usize) -> Self {
        Self::with_content(
            name,
            Content::Csv {
                schema_slug: schema_slug.to_string(),
                text: text.to_string(),
                chunk_size: chunk_size.max(1),
            },
        )
    }

    /// The same record `count` times, generated lazily
    pub fn repeat(name: &str, record: RecordContext, count: u64) -> Self {
        Self::with_content(name, Content::Repeat { record, count })
    }

    /// Emits the records, then fails
    pub fn fail_after(name: &str, records: Vec<RecordContext>) -> Self {
        Self::with_content(name, Content::FailAfter { records })
    }

    pub fn with_update_hash(mut self, hash: &str) -> Self {
        self.update_hash = Some(hash.to_string());
        self
    }

    /// Add a transform that fails when the stream is flushed
    pub fn with_failing_flush(mut self) -> Self {
        self.flush_fails = true;
        self
    }

    pub fn into_arc(self) -> Arc<dyn StreamSummary> {
        Arc::new(self)
    }
}

#[async_trait]
impl StreamSummary for MemoryStreamSummary {
    fn name(&self) -> &str {
        &self.name
    }

    fn update_hash(&self) -> Option<&str> {
        self.update_hash.as_deref()
    }

    async fn open_stream(&self, saved_state: Option<&StreamState>) -> anyhow::Result<OpenedStream> {
        self.opened_with
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .push(saved_state.cloned());

        let mut opened = match &self.content {
            Content::Chunks(chunks) => {
                let items: Vec<anyhow::Result<StreamChunk>> =
                    chunks.iter().cloned().map(Ok).collect();
                OpenedStream::new(stream::iter(items).boxed())
            }
            Content::Csv {
                schema_slug,
                text,
                chunk_size,
            } => {
                let items: Vec<anyhow::Result<StreamChunk>> = text
                    .as_bytes()
                    .chunks(*chunk_size)
                    .map(|c| Ok(StreamChunk::Bytes(c.to_vec())))
                    .collect();
                OpenedStream::new(stream::iter(items).boxed())
                    .with_transform(Box::new(CsvTransform::new(schema_slug)))
                    .with_expected_total_raw_bytes(text.len() as u64)
            }
            Content::Repeat { record, count } => {
                let record = record.clone();
                let items = stream::iter(0..*count)
                    .map(move |_| Ok::<_, anyhow::Error>(StreamChunk::Record(record.clone())));
                OpenedStream::new(items.boxed())
            }
            Content::FailAfter { records } => {
                let mut items: Vec<anyhow::Result<StreamChunk>> = records
                    .iter()
                    .cloned()
                    .map(|r| Ok(StreamChunk::Record(r)))
                    .collect();
                items.push(Err(anyhow::anyhow!("connection reset")));
                OpenedStream::new(stream::iter(items).boxed())
            }
        };

        if self.flush_fails {
            opened = opened.with_transform(Box::new(FailingFlush));
        }
        Ok(opened)
    }
}

/// Sink that keeps every batch in memory
#[derive(Default)]
pub struct CollectingSink {
    pub batches: Vec<ReplayBatch>,
    pub commits: usize,
    /// Fail when asked to write the batch with this index
    pub fail_at: Option<usize>,
}

impl CollectingSink {
    pub fn records(&self) -> Vec<RecordContext> {
        self.batches
            .iter()
            .flat_map(|b| b.records.iter().cloned())
            .collect()
    }
}

#[async_trait]
impl RecordSink for CollectingSink {
    async fn write_batch(&mut self, batch: &ReplayBatch) -> anyhow::Result<()> {
        if self.fail_at == Some(self.batches.len()) {
            anyhow::bail!("disk full");
        }
        self.batches.push(batch.clone());
        Ok(())
    }

    async fn commit(&mut self) -> anyhow::Result<()> {
        self.commits += 1;
        Ok(())
    }
}

/// Progress callbacks recorded for assertions
#[derive(Default)]
pub struct RecordingProgress {
    pub started: Vec<String>,
    pub progress_reports: usize,
    pub completed: Option<StreamStats>,
    pub errors: Vec<String>,
}

impl InspectProgress for RecordingProgress {
    fn on_start(&mut self, stream_name: &str) {
        self.started.push(stream_name.to_string());
    }

    fn on_progress(&mut self, _stats: &StreamStats) {
        self.progress_reports += 1;
    }

    fn on_complete(&mut self, stats: &StreamStats) {
        self.completed = Some(stats.clone());
    }

    fn on_error(&mut self, error: &StreamError) {
        self.errors.push(error.to_string());
    }
}

/// Single-field record
pub fn row(schema_slug: &str, field: &str, value: &str) -> RecordContext {
    RecordContext::from_pairs(schema_slug, [(field, value)])
}
