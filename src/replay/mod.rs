//! Record replay into sinks
//!
//! [`replay`] re-reads a stream set after discovery and yields batches shaped by the
//! finalized schemas:
//!
//! 1. Offset filter (append-only replays): records at or below the saved offset are dropped
//! 2. Schema sanitizer: hidden fields are removed, renamed fields get their new title
//! 3. Deconflictor (optional): conflicted fields are cast, or their record is skipped
//!
//! [`write_replay`] drains the batches into a [`RecordSink`] and returns the
//! [`SinkState`](crate::models::SinkState) to save for the next run.
//!
//! ## Example
//!
//! ```rust,ignore
//! use data_discovery_sdk::inference::ReplayConfig;
//! use data_discovery_sdk::replay::{NoReplayEvents, replay, write_replay};
//! use data_discovery_sdk::state::SinkStateStore;
//!
//! let previous = store.load(&key).await?;
//! let batches = replay(
//!     preview,
//!     Box::new(NoReplayEvents),
//!     result.schemas,
//!     previous.as_ref(),
//!     None,
//!     ReplayConfig::default(),
//! );
//! let summary = write_replay(batches, &mut sink, previous, "1.2.0").await?;
//! store.save(&key, &summary.state).await?;
//! ```

mod deconflict;
mod pipeline;
mod sink;

pub use deconflict::{
    DeconflictOption, DeconflictPolicy, can_cast, deconflict_options, resolve_conflict,
};
pub use pipeline::{NoReplayEvents, ReplayBatch, ReplayEvents, ReplayStream, replay};
pub use sink::{RecordSink, WriteSummary, write_replay};
