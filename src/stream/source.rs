//! Source-side interfaces: stream sets, stream summaries and opened streams
//!
//! Sources describe their physical streams without opening them. A stream is opened only
//! when the orchestrator or the replay pipeline reaches it.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::models::{RecordContext, StreamState, UpdateMethod};

/// One unit flowing through a stream pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Raw bytes, to be parsed by a transform stage
    Bytes(Vec<u8>),
    /// A parsed record
    Record(RecordContext),
}

impl StreamChunk {
    /// Raw bytes carried by this chunk; records count as zero
    pub fn byte_len(&self) -> usize {
        match self {
            StreamChunk::Bytes(bytes) => bytes.len(),
            StreamChunk::Record(_) => 0,
        }
    }
}

impl From<RecordContext> for StreamChunk {
    fn from(record: RecordContext) -> Self {
        StreamChunk::Record(record)
    }
}

impl From<Vec<u8>> for StreamChunk {
    fn from(bytes: Vec<u8>) -> Self {
        StreamChunk::Bytes(bytes)
    }
}

/// Producer side of an opened stream
pub type ChunkStream = BoxStream<'static, anyhow::Result<StreamChunk>>;

/// A parser or other stage supplied by the source
///
/// Transforms run in order; each one receives the chunks emitted by the previous one.
#[async_trait]
pub trait StreamTransform: Send {
    /// Name used in error messages
    fn name(&self) -> &str;

    /// Transform one chunk into zero or more chunks
    async fn transform(&mut self, chunk: StreamChunk) -> anyhow::Result<Vec<StreamChunk>>;

    /// Emit anything still buffered once the upstream ended
    async fn flush(&mut self) -> anyhow::Result<Vec<StreamChunk>> {
        Ok(Vec::new())
    }
}

/// A stream opened by a [`StreamSummary`]
pub struct OpenedStream {
    pub stream: ChunkStream,
    pub transforms: Vec<Box<dyn StreamTransform>>,
    pub expected_record_count: Option<u64>,
    pub expected_total_raw_bytes: Option<u64>,
}

impl OpenedStream {
    pub fn new(stream: ChunkStream) -> Self {
        Self {
            stream,
            transforms: Vec::new(),
            expected_record_count: None,
            expected_total_raw_bytes: None,
        }
    }

    pub fn with_transform(mut self, transform: Box<dyn StreamTransform>) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn with_expected_record_count(mut self, count: u64) -> Self {
        self.expected_record_count = Some(count);
        self
    }

    pub fn with_expected_total_raw_bytes(mut self, bytes: u64) -> Self {
        self.expected_total_raw_bytes = Some(bytes);
        self
    }
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field(
                "transforms",
                &self.transforms.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("expected_record_count", &self.expected_record_count)
            .field("expected_total_raw_bytes", &self.expected_total_raw_bytes)
            .finish()
    }
}

/// One physical stream of a stream set
#[async_trait]
pub trait StreamSummary: Send + Sync {
    /// Stable name, used as the key of the stream's saved state
    fn name(&self) -> &str;

    /// Hash of the stream's current data, if the source can compute one
    fn update_hash(&self) -> Option<&str> {
        None
    }

    fn expected_record_count(&self) -> Option<u64> {
        None
    }

    fn expected_total_raw_bytes(&self) -> Option<u64> {
        None
    }

    /// Open the stream
    ///
    /// `saved_state` is the state written by the last replay into the same sink, if any;
    /// sources may use it to skip data they know was already delivered.
    async fn open_stream(&self, saved_state: Option<&StreamState>) -> anyhow::Result<OpenedStream>;
}

/// Pull-based enumeration of stream summaries
#[async_trait]
pub trait StreamSummaryProducer: Send {
    /// The next stream, or `None` when the set is exhausted
    async fn move_to_next_stream(&mut self) -> anyhow::Result<Option<Arc<dyn StreamSummary>>>;
}

enum StreamSummaries {
    List(Vec<Arc<dyn StreamSummary>>),
    Pull(Box<dyn StreamSummaryProducer>),
}

/// Description of a logical group of physical streams, before any of them is opened
///
/// A preview built from a list can be inspected and replayed any number of times. A
/// pull-based preview is consumed by its first run.
pub struct StreamSetPreview {
    pub slug: String,
    pub supported_update_methods: Vec<UpdateMethod>,
    pub update_hash: Option<String>,
    pub expected_record_count: Option<u64>,
    pub expected_total_raw_bytes: Option<u64>,
    summaries: StreamSummaries,
}

impl StreamSetPreview {
    /// Preview over an eagerly enumerated list of streams
    ///
    /// Expected totals are summed from the summaries when every summary provides one.
    pub fn from_summaries(slug: impl Into<String>, summaries: Vec<Arc<dyn StreamSummary>>) -> Self {
        let expected_record_count = summaries
            .iter()
            .map(|s| s.expected_record_count())
            .sum::<Option<u64>>();
        let expected_total_raw_bytes = summaries
            .iter()
            .map(|s| s.expected_total_raw_bytes())
            .sum::<Option<u64>>();

        Self {
            slug: slug.into(),
            supported_update_methods: vec![UpdateMethod::BatchFullSet],
            update_hash: None,
            expected_record_count,
            expected_total_raw_bytes,
            summaries: StreamSummaries::List(summaries),
        }
    }

    /// Preview whose streams are discovered one at a time
    pub fn from_producer(
        slug: impl Into<String>,
        producer: Box<dyn StreamSummaryProducer>,
    ) -> Self {
        Self {
            slug: slug.into(),
            supported_update_methods: vec![UpdateMethod::BatchFullSet],
            update_hash: None,
            expected_record_count: None,
            expected_total_raw_bytes: None,
            summaries: StreamSummaries::Pull(producer),
        }
    }

    pub fn with_update_methods(mut self, methods: Vec<UpdateMethod>) -> Self {
        self.supported_update_methods = methods;
        self
    }

    pub fn with_update_hash(mut self, hash: impl Into<String>) -> Self {
        self.update_hash = Some(hash.into());
        self
    }

    pub fn with_expected_record_count(mut self, count: u64) -> Self {
        self.expected_record_count = Some(count);
        self
    }

    pub fn with_expected_total_raw_bytes(mut self, bytes: u64) -> Self {
        self.expected_total_raw_bytes = Some(bytes);
        self
    }

    /// The enumerated summaries, for list-based previews
    pub fn stream_summaries(&self) -> Option<&[Arc<dyn StreamSummary>]> {
        match &self.summaries {
            StreamSummaries::List(list) => Some(list),
            StreamSummaries::Pull(_) => None,
        }
    }

    /// Number of streams, when known up front
    pub fn expected_stream_count(&self) -> Option<usize> {
        self.stream_summaries().map(<[_]>::len)
    }

    /// Advance to the next stream
    ///
    /// `cursor` is the run-local position into a list preview; pull previews ignore it.
    pub(crate) async fn next_summary(
        &mut self,
        cursor: &mut usize,
    ) -> anyhow::Result<Option<Arc<dyn StreamSummary>>> {
        match &mut self.summaries {
            StreamSummaries::List(list) => {
                let next = list.get(*cursor).cloned();
                if next.is_some() {
                    *cursor += 1;
                }
                Ok(next)
            }
            StreamSummaries::Pull(producer) => producer.move_to_next_stream().await,
        }
    }
}

impl std::fmt::Debug for StreamSetPreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let summaries = match &self.summaries {
            StreamSummaries::List(list) => {
                format!("{:?}", list.iter().map(|s| s.name()).collect::<Vec<_>>())
            }
            StreamSummaries::Pull(_) => "<pull>".to_string(),
        };
        f.debug_struct("StreamSetPreview")
            .field("slug", &self.slug)
            .field("supported_update_methods", &self.supported_update_methods)
            .field("update_hash", &self.update_hash)
            .field("expected_record_count", &self.expected_record_count)
            .field("expected_total_raw_bytes", &self.expected_total_raw_bytes)
            .field("stream_summaries", &summaries)
            .finish()
    }
}
