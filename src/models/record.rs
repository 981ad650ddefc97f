//! Records as emitted by sources and parsers

use serde::{Deserialize, Serialize};

use super::value::{Record, Value};

/// One logical record plus the schema it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordContext {
    /// Maps to the title of a [`Schema`](super::Schema)
    pub schema_slug: String,
    pub record: Record,
    /// Position inside the physical stream, monotonically non-decreasing for append-style sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl RecordContext {
    pub fn new(schema_slug: impl Into<String>, record: Record) -> Self {
        Self {
            schema_slug: schema_slug.into(),
            record,
            offset: None,
        }
    }

    /// Attach a resumption offset
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Build a record from `(field, value)` pairs, keeping their order
    pub fn from_pairs<K, V, I>(schema_slug: impl Into<String>, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let record = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::new(schema_slug, record)
    }
}
