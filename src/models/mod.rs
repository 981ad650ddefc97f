//! Models module for the SDK
//!
//! Defines the data shared by discovery and replay: record values, records tagged
//! with their schema, discovered schemas with their statistics, and persisted sink state.

pub mod record;
pub mod schema;
pub mod state;
pub mod value;

pub use record::RecordContext;
pub use schema::{
    ContentLabel, CountPrecision, DiscoveredType, Property, Schema, ValueFormat, ValueKind,
    ValueType, ValueTypeStatistics,
};
pub use state::{
    SchemaState, SinkState, SinkStateKey, StreamSetState, StreamState, UpdateMethod,
    compute_update_hash,
};
pub use value::{Record, Value};
