//! Streaming schema discovery
//!
//! A [`StreamSetPreview`] describes a group of physical streams. [`inspect`] reads them one
//! after another through a stage pipeline (byte counter, source transforms, batcher) into
//! the stats stage, and returns the finalized schemas together with [`StreamStats`].
//!
//! ## Ceilings
//!
//! - Past `max_inspect_records` records are only counted, no longer inspected
//! - Past `max_count_records` the run is finalized early with
//!   [`FinalizeReason::CeilingReached`] and counts are marked `GREATER_THAN`
//!
//! ## Example
//!
//! ```rust,ignore
//! use data_discovery_sdk::inference::InspectionConfig;
//! use data_discovery_sdk::stream::{NoProgress, StreamSetPreview, inspect};
//!
//! let mut preview = StreamSetPreview::from_summaries("orders", summaries);
//! let result = inspect(&mut preview, &mut NoProgress, &InspectionConfig::default()).await?;
//! for schema in &result.schemas {
//!     println!("{}: {} records", schema.title, schema.record_count);
//! }
//! ```

mod error;
mod inspector;
pub(crate) mod pipeline;
mod progress;
mod source;

pub use error::{StreamError, StreamResult};
pub use inspector::{FinalizeReason, InspectionResult, inspect, inspect_with_detector};
#[cfg(feature = "progress-bar")]
pub use progress::ProgressBarReporter;
pub use progress::{
    EstimatedCount, InspectProgress, NoProgress, StreamStats, format_bytes, format_number,
};
pub use source::{
    ChunkStream, OpenedStream, StreamChunk, StreamSetPreview, StreamSummary,
    StreamSummaryProducer, StreamTransform,
};
