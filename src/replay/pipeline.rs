//! Record replay: re-reads a stream set and emits sanitized batches for a sink

use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use crate::inference::ReplayConfig;
use crate::models::{
    Record, RecordContext, Schema, SinkState, StreamSetState, StreamState, UpdateMethod,
};
use crate::stream::pipeline::StagePipeline;
use crate::stream::{StreamError, StreamResult, StreamSetPreview};

use super::deconflict::{DeconflictOption, DeconflictPolicy, resolve_conflict};

/// A batch of replayed records from one physical stream
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayBatch {
    pub stream_set_slug: String,
    pub stream_name: String,
    /// Update hash reported by the stream's summary
    pub update_hash: Option<String>,
    pub records: Vec<RecordContext>,
}

/// Callbacks invoked by the replay producer
///
/// All methods default to no-ops.
pub trait ReplayEvents: Send {
    fn on_stream_start(&mut self, _stream_name: &str) {}

    /// Raw bytes read so far from the current stream; not called for record-oriented streams
    fn on_bytes(&mut self, _stream_name: &str, _bytes_read: u64) {}

    /// A stream ended; `records` is the number of records emitted for it
    fn on_stream_end(&mut self, _stream_name: &str, _records: u64) {}
}

/// Replay events sink that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReplayEvents;

impl ReplayEvents for NoReplayEvents {}

/// Drops records at or below the saved stream offset
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct OffsetFilter {
    stream_offset: Option<u64>,
}

impl OffsetFilter {
    pub(crate) fn new(stream_offset: Option<u64>) -> Self {
        Self { stream_offset }
    }

    pub(crate) fn keep(&self, ctx: &RecordContext) -> bool {
        match (self.stream_offset, ctx.offset) {
            (Some(saved), Some(offset)) => offset > saved,
            _ => true,
        }
    }
}

/// Applies hidden and renamed properties of the finalized schemas
#[derive(Debug, Clone)]
pub(crate) struct SchemaSanitizer {
    schemas: HashMap<String, Schema>,
}

impl SchemaSanitizer {
    pub(crate) fn new(schemas: Vec<Schema>) -> Self {
        Self {
            schemas: schemas.into_iter().map(|s| (s.title.clone(), s)).collect(),
        }
    }

    pub(crate) fn schema(&self, title: &str) -> Option<&Schema> {
        self.schemas.get(title)
    }

    /// Drop hidden and unknown fields, rename the others to their property titles
    pub(crate) fn sanitize(&self, ctx: RecordContext) -> StreamResult<RecordContext> {
        let schema =
            self.schemas
                .get(&ctx.schema_slug)
                .ok_or_else(|| StreamError::SchemaConsistency {
                    schema_slug: ctx.schema_slug.clone(),
                })?;

        let mut record = Record::with_capacity(ctx.record.len());
        for (field, value) in ctx.record {
            match schema.properties.get(&field) {
                Some(property) if !property.hidden => {
                    record.insert(property.title.clone(), value);
                }
                _ => {}
            }
        }

        Ok(RecordContext { record, ..ctx })
    }
}

/// Applies a deconfliction policy to sanitized records
#[derive(Debug, Clone, Default)]
pub(crate) struct Deconflictor {
    rules: HashMap<String, Vec<(String, DeconflictOption)>>,
}

impl Deconflictor {
    /// Resolve the policy's field names to the names records carry after sanitizing
    pub(crate) fn new(policy: &DeconflictPolicy, sanitizer: &SchemaSanitizer) -> Self {
        let mut rules: HashMap<String, Vec<(String, DeconflictOption)>> = HashMap::new();
        for (schema_title, fields) in policy.schemas() {
            let schema = sanitizer.schema(schema_title);
            for (field, option) in fields {
                let output = match schema.and_then(|s| s.properties.get(field)) {
                    Some(property) if property.hidden => continue,
                    Some(property) => property.title.clone(),
                    None => field.clone(),
                };
                rules
                    .entry(schema_title.clone())
                    .or_default()
                    .push((output, *option));
            }
        }
        Self { rules }
    }

    /// Resolve every conflicted field; `None` drops the record
    pub(crate) fn apply(&self, mut ctx: RecordContext) -> StreamResult<Option<RecordContext>> {
        let Some(rules) = self.rules.get(&ctx.schema_slug) else {
            return Ok(Some(ctx));
        };

        for (field, option) in rules {
            let Some(value) = ctx.record.get_mut(field) else {
                continue;
            };
            match resolve_conflict(value, option)? {
                Some(resolved) => *value = resolved,
                None => return Ok(None),
            }
        }
        Ok(Some(ctx))
    }
}

/// Replay a stream set
///
/// Spawns a producer task that reads the streams in order and sends batches through a
/// bounded channel; the returned [`ReplayStream`] yields them. In append-only mode each
/// stream receives its saved state and records at or below the saved offset are dropped.
/// Records are sanitized against `schemas`, then resolved with `deconflict` if given.
///
/// Must be called from within a tokio runtime.
pub fn replay(
    preview: StreamSetPreview,
    events: Box<dyn ReplayEvents>,
    schemas: Vec<Schema>,
    sink_state: Option<&SinkState>,
    deconflict: Option<DeconflictPolicy>,
    config: ReplayConfig,
) -> ReplayStream {
    let update_method =
        UpdateMethod::negotiate(&preview.supported_update_methods, &[config.update_method]);
    let stream_set_slug = preview.slug.clone();
    let update_hash = preview.update_hash.clone();

    let saved = if update_method.is_append() {
        sink_state.and_then(|s| s.stream_sets.get(&stream_set_slug).cloned())
    } else {
        None
    };

    let sanitizer = SchemaSanitizer::new(schemas);
    let deconflictor = deconflict
        .filter(|policy| !policy.is_empty())
        .map(|policy| Deconflictor::new(&policy, &sanitizer));

    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let producer = Producer {
        preview,
        events,
        sanitizer,
        deconflictor,
        saved,
        batch_size: config.batch_size,
        tx,
    };

    let span = info_span!(
        "replay",
        stream_set = %stream_set_slug,
        run_id = %Uuid::new_v4(),
        method = %update_method
    );
    let handle = tokio::spawn(producer.run().instrument(span));

    ReplayStream {
        rx,
        handle: Some(handle),
        stream_set_slug,
        update_hash,
        update_method,
    }
}

struct Producer {
    preview: StreamSetPreview,
    events: Box<dyn ReplayEvents>,
    sanitizer: SchemaSanitizer,
    deconflictor: Option<Deconflictor>,
    saved: Option<StreamSetState>,
    batch_size: usize,
    tx: mpsc::Sender<StreamResult<ReplayBatch>>,
}

impl Producer {
    async fn run(mut self) {
        info!("Starting replay");
        match self.produce().await {
            Ok(true) => info!("Replay finished"),
            Ok(false) => debug!("Replay consumer went away"),
            Err(e) => {
                error!(error = %e, "Replay failed");
                let _ = self.tx.send(Err(e)).await;
            }
        }
    }

    /// Returns `false` when the consumer dropped the stream
    async fn produce(&mut self) -> StreamResult<bool> {
        let mut cursor = 0;
        loop {
            let summary = self
                .preview
                .next_summary(&mut cursor)
                .await
                .map_err(|e| StreamError::enumeration_failure(self.preview.slug.as_str(), e))?;
            let Some(summary) = summary else {
                return Ok(true);
            };

            let name = summary.name().to_string();
            let saved: Option<StreamState> = self
                .saved
                .as_ref()
                .and_then(|set| set.stream_states.get(&name))
                .cloned();
            let filter = OffsetFilter::new(saved.as_ref().and_then(|s| s.stream_offset));
            let update_hash = summary.update_hash().map(str::to_string);

            self.events.on_stream_start(&name);
            let opened = summary
                .open_stream(saved.as_ref())
                .await
                .map_err(|e| StreamError::source_failure(name.as_str(), e))?;
            debug!(
                stream = %name,
                saved_offset = ?saved.as_ref().and_then(|s| s.stream_offset),
                "Replaying stream"
            );

            let mut pipeline =
                StagePipeline::new(name.as_str(), opened.transforms, self.batch_size);
            let mut stream = opened.stream;
            let mut emitted = 0u64;

            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| StreamError::source_failure(name.as_str(), e))?;
                let is_bytes = chunk.byte_len() > 0;
                let batches = pipeline.push(chunk).await?;
                if is_bytes {
                    self.events.on_bytes(&name, pipeline.bytes_read());
                }
                for batch in batches {
                    match self.emit(&name, &update_hash, &filter, batch).await? {
                        Some(n) => emitted += n,
                        None => return Ok(false),
                    }
                }
            }

            for batch in pipeline.finish().await? {
                match self.emit(&name, &update_hash, &filter, batch).await? {
                    Some(n) => emitted += n,
                    None => return Ok(false),
                }
            }

            self.events.on_stream_end(&name, emitted);
            debug!(stream = %name, records = emitted, "Stream replayed");
        }
    }

    /// Filter, sanitize and resolve one batch, then send it
    ///
    /// Returns the number of records sent, or `None` when the receiver is gone.
    async fn emit(
        &mut self,
        stream_name: &str,
        update_hash: &Option<String>,
        filter: &OffsetFilter,
        batch: Vec<RecordContext>,
    ) -> StreamResult<Option<u64>> {
        let mut records = Vec::with_capacity(batch.len());
        for ctx in batch.into_iter().filter(|ctx| filter.keep(ctx)) {
            let ctx = self.sanitizer.sanitize(ctx)?;
            let ctx = match &self.deconflictor {
                Some(deconflictor) => match deconflictor.apply(ctx)? {
                    Some(ctx) => ctx,
                    None => continue,
                },
                None => ctx,
            };
            records.push(ctx);
        }

        if records.is_empty() {
            return Ok(Some(0));
        }

        let count = records.len() as u64;
        let batch = ReplayBatch {
            stream_set_slug: self.preview.slug.clone(),
            stream_name: stream_name.to_string(),
            update_hash: update_hash.clone(),
            records,
        };
        match self.tx.send(Ok(batch)).await {
            Ok(()) => Ok(Some(count)),
            Err(_) => Ok(None),
        }
    }
}

/// Batches produced by [`replay`]
///
/// Yields `Err` at most once, as the last item. Dropping the stream stops the producer.
pub struct ReplayStream {
    rx: mpsc::Receiver<StreamResult<ReplayBatch>>,
    handle: Option<JoinHandle<()>>,
    stream_set_slug: String,
    update_hash: Option<String>,
    update_method: UpdateMethod,
}

impl ReplayStream {
    pub fn stream_set_slug(&self) -> &str {
        &self.stream_set_slug
    }

    /// Update hash of the whole stream set, as reported by the preview
    pub fn stream_set_update_hash(&self) -> Option<&str> {
        self.update_hash.as_deref()
    }

    /// Update method in effect after negotiating with the source
    pub fn update_method(&self) -> UpdateMethod {
        self.update_method
    }
}

impl Stream for ReplayStream {
    type Item = StreamResult<ReplayBatch>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) => Poll::Ready(Some(item)),
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                let Some(handle) = this.handle.as_mut() else {
                    return Poll::Ready(None);
                };
                match Pin::new(handle).poll(cx) {
                    Poll::Pending => Poll::Pending,
                    Poll::Ready(result) => {
                        this.handle = None;
                        match result {
                            Ok(()) => Poll::Ready(None),
                            Err(e) => Poll::Ready(Some(Err(StreamError::ProducerFailed(
                                e.to_string(),
                            )))),
                        }
                    }
                }
            }
        }
    }
}

impl Drop for ReplayStream {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for ReplayStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayStream")
            .field("stream_set_slug", &self.stream_set_slug)
            .field("update_hash", &self.update_hash)
            .field("update_method", &self.update_method)
            .field("running", &self.handle.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Property, Value};

    fn schema() -> Schema {
        let mut schema = Schema::new("people");
        for field in ["name", "email", "age"] {
            schema
                .properties
                .insert(field.to_string(), Property::new(field));
        }
        schema.hide_property("email");
        schema.rename_property("age", "years");
        schema
    }

    #[test]
    fn test_offset_filter() {
        let filter = OffsetFilter::new(Some(10));
        let at = |o| RecordContext::from_pairs("s", [("a", 1i64)]).with_offset(o);
        assert!(!filter.keep(&at(10)));
        assert!(filter.keep(&at(11)));
        assert!(filter.keep(&RecordContext::from_pairs("s", [("a", 1i64)])));
        assert!(OffsetFilter::default().keep(&at(0)));
    }

    #[test]
    fn test_sanitizer_hides_and_renames() {
        let sanitizer = SchemaSanitizer::new(vec![schema()]);
        let ctx = RecordContext::from_pairs(
            "people",
            [
                ("name", "Ada"),
                ("email", "ada@example.com"),
                ("age", "36"),
                ("unknown", "x"),
            ],
        );

        let out = sanitizer.sanitize(ctx).unwrap();
        let fields: Vec<_> = out.record.keys().cloned().collect();
        assert_eq!(fields, vec!["name", "years"]);
        assert_eq!(out.record["years"], Value::from("36"));
    }

    #[test]
    fn test_sanitizer_rejects_unknown_schema() {
        let sanitizer = SchemaSanitizer::new(vec![schema()]);
        let err = sanitizer
            .sanitize(RecordContext::from_pairs("pets", [("name", "Rex")]))
            .unwrap_err();
        assert!(
            matches!(err, StreamError::SchemaConsistency { schema_slug } if schema_slug == "pets")
        );
    }

    #[test]
    fn test_deconflictor_uses_output_names() {
        use crate::models::ValueKind;

        let sanitizer = SchemaSanitizer::new(vec![schema()]);
        let policy = DeconflictPolicy::new().with(
            "people",
            "age",
            DeconflictOption::Skip(ValueKind::Integer),
        );
        let deconflictor = Deconflictor::new(&policy, &sanitizer);

        let keep = sanitizer
            .sanitize(RecordContext::from_pairs("people", [("age", "36")]))
            .unwrap();
        let kept = deconflictor.apply(keep).unwrap().unwrap();
        assert_eq!(kept.record["years"], Value::Integer(36));

        let drop = sanitizer
            .sanitize(RecordContext::from_pairs("people", [("age", "unknown")]))
            .unwrap();
        assert!(deconflictor.apply(drop).unwrap().is_none());
    }
}
