//! Data Discovery SDK - Streaming schema discovery and record replay
//!
//! Provides unified interfaces for:
//! - Value classification and type merging (inference)
//! - Schema discovery over sets of physical streams, with inspect and count ceilings
//! - Record replay into sinks: offset filtering, schema sanitizing, deconfliction
//! - Sink state tracking for resumable append-only replays

pub mod inference;
pub mod models;
pub mod replay;
pub mod state;
pub mod stream;

// Re-export commonly used types
pub use inference::{
    ContentLabelDetector, InferenceError, InspectionConfig, PatternContentLabelDetector,
    ReplayConfig, StatsStage, classify, finalize_schemas,
};
pub use replay::{
    DeconflictOption, DeconflictPolicy, RecordSink, ReplayBatch, ReplayEvents, ReplayStream,
    WriteSummary, replay, write_replay,
};
#[cfg(feature = "native-fs")]
pub use state::FileSinkStateStore;
pub use state::{MemorySinkStateStore, SinkStateStore, StateError};
pub use stream::{
    FinalizeReason, InspectProgress, InspectionResult, OpenedStream, StreamChunk, StreamError,
    StreamResult, StreamSetPreview, StreamStats, StreamSummary, StreamSummaryProducer,
    StreamTransform, inspect,
};

// Re-export models
pub use models::{
    CountPrecision, Property, Record, RecordContext, Schema, SinkState, SinkStateKey,
    StreamState, UpdateMethod, Value, ValueType,
};
