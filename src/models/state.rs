//! Persisted replay state and update-method negotiation

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How reads from a source relate to earlier reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateMethod {
    /// Every read is a complete replacement
    BatchFullSet,
    /// Reads are incremental and offset-addressable
    AppendOnlyLog,
}

impl UpdateMethod {
    /// Choose the method for a source/sink pairing
    ///
    /// Append-only replay is used only when both sides support it.
    pub fn negotiate(source: &[UpdateMethod], sink: &[UpdateMethod]) -> UpdateMethod {
        let append = UpdateMethod::AppendOnlyLog;
        if source.contains(&append) && sink.contains(&append) {
            UpdateMethod::AppendOnlyLog
        } else {
            UpdateMethod::BatchFullSet
        }
    }

    pub fn is_append(&self) -> bool {
        matches!(self, UpdateMethod::AppendOnlyLog)
    }
}

impl std::fmt::Display for UpdateMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BatchFullSet => write!(f, "BATCH_FULL_SET"),
            Self::AppendOnlyLog => write!(f, "APPEND_ONLY_LOG"),
        }
    }
}

/// Identifies one persisted [`SinkState`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkStateKey {
    pub catalog_slug: String,
    pub package_slug: String,
    pub package_major_version: u32,
}

impl SinkStateKey {
    pub fn new(
        catalog_slug: impl Into<String>,
        package_slug: impl Into<String>,
        package_major_version: u32,
    ) -> Self {
        Self {
            catalog_slug: catalog_slug.into(),
            package_slug: package_slug.into(),
            package_major_version,
        }
    }
}

impl std::fmt::Display for SinkStateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.catalog_slug, self.package_slug, self.package_major_version
        )
    }
}

/// Last written offset for one schema inside a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaState {
    pub last_offset: u64,
}

/// Replay position of one physical stream
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_hash: Option<String>,
    #[serde(default)]
    pub schema_states: BTreeMap<String, SchemaState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_offset: Option<u64>,
}

impl StreamState {
    /// Track an emitted record; offsets only ever move forward
    pub fn record_offset(&mut self, schema_title: &str, offset: u64) {
        self.stream_offset = Some(self.stream_offset.map_or(offset, |o| o.max(offset)));
        let state = self
            .schema_states
            .entry(schema_title.to_string())
            .or_default();
        state.last_offset = state.last_offset.max(offset);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSetState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_hash: Option<String>,
    #[serde(default)]
    pub stream_states: BTreeMap<String, StreamState>,
}

/// Everything written to a sink for one package major version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkState {
    pub package_version: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub stream_sets: BTreeMap<String, StreamSetState>,
}

impl SinkState {
    pub fn new(package_version: impl Into<String>) -> Self {
        Self {
            package_version: package_version.into(),
            timestamp: Utc::now(),
            stream_sets: BTreeMap::new(),
        }
    }

    pub fn stream_state(&self, stream_set: &str, stream: &str) -> Option<&StreamState> {
        self.stream_sets
            .get(stream_set)
            .and_then(|set| set.stream_states.get(stream))
    }

    /// Get or create the state of one stream
    pub fn stream_state_mut(&mut self, stream_set: &str, stream: &str) -> &mut StreamState {
        self.stream_sets
            .entry(stream_set.to_string())
            .or_default()
            .stream_states
            .entry(stream.to_string())
            .or_default()
    }

    /// Whether the stream set's data changed since this state was written
    ///
    /// Unknown stream sets and missing hashes count as changed.
    pub fn stream_set_changed(&self, stream_set: &str, update_hash: Option<&str>) -> bool {
        match (self.stream_sets.get(stream_set), update_hash) {
            (Some(set), Some(hash)) => set.update_hash.as_deref() != Some(hash),
            _ => true,
        }
    }

    /// Refresh the timestamp, e.g. before saving
    pub fn touch(&mut self) {
        self.timestamp = Utc::now();
    }
}

/// Hash identifying a version of a source's data
///
/// Parts are hashed in order with a separator so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn compute_update_hash<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate() {
        use UpdateMethod::*;
        assert_eq!(
            UpdateMethod::negotiate(&[BatchFullSet, AppendOnlyLog], &[AppendOnlyLog]),
            AppendOnlyLog
        );
        assert_eq!(
            UpdateMethod::negotiate(&[AppendOnlyLog], &[BatchFullSet]),
            BatchFullSet
        );
        assert_eq!(UpdateMethod::negotiate(&[], &[]), BatchFullSet);
    }

    #[test]
    fn test_record_offset_keeps_maximum() {
        let mut state = StreamState::default();
        state.record_offset("a", 5);
        state.record_offset("b", 9);
        state.record_offset("a", 3);

        assert_eq!(state.stream_offset, Some(9));
        assert_eq!(state.schema_states["a"].last_offset, 5);
        assert_eq!(state.schema_states["b"].last_offset, 9);
    }

    #[test]
    fn test_serialized_layout() {
        let mut sink_state = SinkState::new("1.2.0");
        let stream = sink_state.stream_state_mut("orders", "orders.csv");
        stream.update_hash = Some("abc".to_string());
        stream.record_offset("orders", 10);

        let json = serde_json::to_value(&sink_state).unwrap();
        assert_eq!(json["packageVersion"], "1.2.0");
        assert!(json["timestamp"].is_string());
        let stream_json = &json["streamSets"]["orders"]["streamStates"]["orders.csv"];
        assert_eq!(stream_json["updateHash"], "abc");
        assert_eq!(stream_json["streamOffset"], 10);
        assert_eq!(stream_json["schemaStates"]["orders"]["lastOffset"], 10);
    }

    #[test]
    fn test_stream_set_changed() {
        let mut sink_state = SinkState::new("1.0.0");
        assert!(sink_state.stream_set_changed("s", Some("h1")));

        sink_state.stream_sets.insert(
            "s".to_string(),
            StreamSetState {
                update_hash: Some("h1".to_string()),
                stream_states: BTreeMap::new(),
            },
        );
        assert!(!sink_state.stream_set_changed("s", Some("h1")));
        assert!(sink_state.stream_set_changed("s", Some("h2")));
        assert!(sink_state.stream_set_changed("s", None));
    }

    #[test]
    fn test_update_hash_separates_parts() {
        let a = compute_update_hash(["ab", "c"]);
        let b = compute_update_hash(["a", "bc"]);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, compute_update_hash(vec!["ab".to_string(), "c".to_string()]));
    }
}
