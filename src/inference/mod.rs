//! Value-type discovery for streamed records
//!
//! This module classifies individual record values, accumulates per-field statistics
//! batch by batch and finalizes them into [`Schema`](crate::models::Schema)s.
//!
//! ## Features
//!
//! - **Classification** - Detect null, binary (`0`/`1`), boolean, number, date and string values
//! - **Date detection** - ISO 8601, RFC 1123 and common locale date forms
//! - **Type merging** - Reconcile the types seen for a field into a minimal set
//! - **Bounded statistics** - Min/max ranges, value histograms capped per bucket, sample records
//! - **Content labels** - Pluggable detector for sensitive or well-known value patterns
//!
//! ## Example
//!
//! ```rust,ignore
//! use data_discovery_sdk::inference::{
//!     InspectionConfig, ProgressDirective, StatsStage, finalize_schemas,
//! };
//! use data_discovery_sdk::models::{CountPrecision, RecordContext};
//!
//! let config = InspectionConfig::default();
//! let mut stage = StatsStage::new(&config);
//! let batch = vec![RecordContext::from_pairs("people", [("name", "Alice"), ("age", "30")])];
//! stage.process_batch(&batch, |_| ProgressDirective::Inspect)?;
//!
//! let (schemas, detector) = stage.into_parts();
//! let schemas = finalize_schemas(schemas, CountPrecision::Exact, detector.as_ref(), &config);
//! println!("{}", serde_json::to_string_pretty(&schemas)?);
//! ```

mod accumulator;
mod classify;
mod config;
mod convert;
mod error;
mod finalize;
mod formats;
mod labels;
mod merge;

pub use accumulator::{ProgressDirective, StatsOutcome, StatsStage};
pub use classify::{classify, classify_str, parse_boolean, parse_number};
pub use config::{InspectionConfig, InspectionConfigBuilder, ReplayConfig, ReplayConfigBuilder};
pub use convert::{cast_to_kind, to_canonical};
pub use error::InferenceError;
pub use finalize::{finalize_schema, finalize_schemas};
pub use formats::{detect_date_format, parse_date};
pub use labels::{ContentLabelDetector, NoopContentLabelDetector, PatternContentLabelDetector};
pub use merge::{merge_value_formats, merge_value_type_stats, merge_value_types};
