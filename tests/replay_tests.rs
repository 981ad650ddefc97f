//! Record replay tests

mod common;

use std::sync::{Arc, Mutex};

use common::{MemoryStreamSummary, row};
use data_discovery_sdk::inference::{InspectionConfig, ReplayConfig};
use data_discovery_sdk::models::{
    RecordContext, Schema, SinkState, UpdateMethod, Value, ValueKind,
};
use data_discovery_sdk::replay::{
    DeconflictOption, DeconflictPolicy, NoReplayEvents, ReplayBatch, ReplayEvents, ReplayStream,
    deconflict_options, replay,
};
use data_discovery_sdk::stream::{NoProgress, StreamError, StreamSetPreview, inspect};
use futures::{StreamExt, TryStreamExt};

async fn discover(preview: &mut StreamSetPreview) -> Vec<Schema> {
    inspect(preview, &mut NoProgress, &InspectionConfig::default())
        .await
        .unwrap()
        .schemas
}

async fn drain(stream: ReplayStream) -> Result<Vec<ReplayBatch>, StreamError> {
    stream.try_collect().await
}

fn replayed(batches: &[ReplayBatch]) -> Vec<RecordContext> {
    batches
        .iter()
        .flat_map(|b| b.records.iter().cloned())
        .collect()
}

fn offsets_preview(summary: MemoryStreamSummary) -> StreamSetPreview {
    StreamSetPreview::from_summaries("log", vec![summary.into_arc()])
        .with_update_methods(vec![UpdateMethod::BatchFullSet, UpdateMethod::AppendOnlyLog])
}

fn offset_records() -> Vec<RecordContext> {
    (0..=20u64)
        .map(|n| RecordContext::from_pairs("entries", [("n", n.to_string())]).with_offset(n))
        .collect()
}

mod offset_tests {
    use super::*;

    #[tokio::test]
    async fn test_append_replay_skips_delivered_offsets() {
        let summary = MemoryStreamSummary::records("log.jsonl", offset_records());
        let opened_with = summary.opened_with.clone();
        let mut preview = offsets_preview(summary);
        let schemas = discover(&mut preview).await;

        let mut state = SinkState::new("1.0.0");
        state
            .stream_state_mut("log", "log.jsonl")
            .record_offset("entries", 10);

        let stream = replay(
            preview,
            Box::new(NoReplayEvents),
            schemas,
            Some(&state),
            None,
            ReplayConfig::default(),
        );
        assert_eq!(stream.update_method(), UpdateMethod::AppendOnlyLog);

        let batches = drain(stream).await.unwrap();
        let offsets: Vec<u64> = replayed(&batches).iter().filter_map(|r| r.offset).collect();
        assert_eq!(offsets, (11..=20).collect::<Vec<_>>());

        // The source saw no state while discovering, then the saved state on replay
        let opened = opened_with.lock().unwrap();
        assert_eq!(opened.len(), 2);
        assert!(opened[0].is_none());
        assert_eq!(opened[1].as_ref().and_then(|s| s.stream_offset), Some(10));
    }

    #[tokio::test]
    async fn test_full_set_replay_ignores_saved_offsets() {
        let summary = MemoryStreamSummary::records("log.jsonl", offset_records());
        let opened_with = summary.opened_with.clone();
        let mut preview = StreamSetPreview::from_summaries("log", vec![summary.into_arc()]);
        let schemas = discover(&mut preview).await;

        let mut state = SinkState::new("1.0.0");
        state
            .stream_state_mut("log", "log.jsonl")
            .record_offset("entries", 10);

        let stream = replay(
            preview,
            Box::new(NoReplayEvents),
            schemas,
            Some(&state),
            None,
            ReplayConfig::default(),
        );
        assert_eq!(stream.update_method(), UpdateMethod::BatchFullSet);

        let batches = drain(stream).await.unwrap();
        assert_eq!(replayed(&batches).len(), 21);
        assert!(opened_with.lock().unwrap().iter().all(Option::is_none));
    }
}

mod sanitize_tests {
    use super::*;

    #[tokio::test]
    async fn test_csv_round_trip() {
        let text = "a,b\nx,1\ny,2\n";
        let mut preview = StreamSetPreview::from_summaries(
            "table",
            vec![MemoryStreamSummary::csv("table.csv", "table", text, 4).into_arc()],
        );
        let schemas = discover(&mut preview).await;

        let stream = replay(
            preview,
            Box::new(NoReplayEvents),
            schemas,
            None,
            None,
            ReplayConfig::default(),
        );
        let batches = drain(stream).await.unwrap();
        let out = replayed(&batches);

        assert_eq!(out.len(), 2);
        for record in &out {
            let fields: Vec<_> = record.record.keys().map(String::as_str).collect();
            assert_eq!(fields, vec!["a", "b"]);
        }
        assert_eq!(out[0].record["a"], Value::from("x"));
        assert_eq!(out[1].record["b"], Value::from("2"));
        assert_eq!(batches[0].stream_name, "table.csv");
        assert_eq!(batches[0].stream_set_slug, "table");
    }

    #[tokio::test]
    async fn test_hidden_and_renamed_fields() {
        let records = vec![RecordContext::from_pairs(
            "users",
            [("id", "7"), ("mail", "a@b.c"), ("nm", "Ada")],
        )];
        let mut preview = StreamSetPreview::from_summaries(
            "users",
            vec![MemoryStreamSummary::records("users", records).into_arc()],
        );
        let mut schemas = discover(&mut preview).await;
        assert!(schemas[0].hide_property("mail"));
        assert!(schemas[0].rename_property("nm", "name"));

        let stream = replay(
            preview,
            Box::new(NoReplayEvents),
            schemas,
            None,
            None,
            ReplayConfig::default(),
        );
        let out = replayed(&drain(stream).await.unwrap());

        let fields: Vec<_> = out[0].record.keys().map(String::as_str).collect();
        assert_eq!(fields, vec!["id", "name"]);
        assert_eq!(out[0].record["name"], Value::from("Ada"));
    }

    #[tokio::test]
    async fn test_unknown_schema_is_fatal() {
        let preview = StreamSetPreview::from_summaries(
            "set",
            vec![MemoryStreamSummary::records("s", vec![row("ghost", "a", "1")]).into_arc()],
        );

        let stream = replay(
            preview,
            Box::new(NoReplayEvents),
            Vec::new(),
            None,
            None,
            ReplayConfig::default(),
        );
        let err = drain(stream).await.unwrap_err();
        assert!(
            matches!(&err, StreamError::SchemaConsistency { schema_slug } if schema_slug == "ghost")
        );
    }

    #[tokio::test]
    async fn test_small_batches() {
        let records = (0..25).map(|n| row("rows", "n", &n.to_string())).collect();
        let mut preview = StreamSetPreview::from_summaries(
            "set",
            vec![MemoryStreamSummary::records("rows", records).into_arc()],
        );
        let schemas = discover(&mut preview).await;

        let config = ReplayConfig::builder().batch_size(10).channel_capacity(1).build();
        let stream = replay(preview, Box::new(NoReplayEvents), schemas, None, None, config);
        let sizes: Vec<_> = drain(stream)
            .await
            .unwrap()
            .iter()
            .map(|b| b.records.len())
            .collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }
}

mod deconflict_tests {
    use super::*;

    #[tokio::test]
    async fn test_skip_policy_drops_mismatching_records() {
        let values = ["42", "abc", "7", "x"];
        let records = values.iter().map(|v| row("items", "qty", v)).collect();
        let mut preview = StreamSetPreview::from_summaries(
            "items",
            vec![MemoryStreamSummary::records("items", records).into_arc()],
        );
        let schemas = discover(&mut preview).await;

        let property = &schemas[0].properties["qty"];
        assert!(property.is_conflicted());
        let options = deconflict_options(&property.value_kinds());
        let skip = DeconflictOption::Skip(ValueKind::Integer);
        assert!(options.contains(&skip));

        let policy = DeconflictPolicy::new().with("items", "qty", skip);
        let stream = replay(
            preview,
            Box::new(NoReplayEvents),
            schemas,
            None,
            Some(policy),
            ReplayConfig::default(),
        );
        let out = replayed(&drain(stream).await.unwrap());

        let qty: Vec<_> = out.iter().map(|r| r.record["qty"].clone()).collect();
        assert_eq!(qty, vec![Value::Integer(42), Value::Integer(7)]);
    }

    #[tokio::test]
    async fn test_offered_casts_replay_every_value() {
        let records: Vec<RecordContext> = ["true", "5", "false"]
            .iter()
            .map(|v| row("flags", "on", v))
            .collect();
        let mut preview = StreamSetPreview::from_summaries(
            "flags",
            vec![MemoryStreamSummary::records("flags", records.clone()).into_arc()],
        );
        let schemas = discover(&mut preview).await;

        let kinds = schemas[0].properties["on"].value_kinds();
        assert_eq!(
            kinds.iter().copied().collect::<Vec<_>>(),
            vec![ValueKind::Boolean, ValueKind::Integer]
        );

        let expected = [
            (
                ValueKind::Boolean,
                vec![Value::Boolean(true), Value::Boolean(true), Value::Boolean(false)],
            ),
            (
                ValueKind::Integer,
                vec![Value::Integer(1), Value::Integer(5), Value::Integer(0)],
            ),
        ];
        let options = deconflict_options(&kinds);
        for (kind, values) in expected {
            let cast = DeconflictOption::Cast(kind);
            assert!(options.contains(&cast), "{cast} not offered");

            let preview = StreamSetPreview::from_summaries(
                "flags",
                vec![MemoryStreamSummary::records("flags", records.clone()).into_arc()],
            );
            let policy = DeconflictPolicy::new().with("flags", "on", cast);
            let stream = replay(
                preview,
                Box::new(NoReplayEvents),
                schemas.clone(),
                None,
                Some(policy),
                ReplayConfig::default(),
            );
            let out = replayed(&drain(stream).await.unwrap());

            let on: Vec<_> = out.iter().map(|r| r.record["on"].clone()).collect();
            assert_eq!(on, values);
        }
    }

    #[tokio::test]
    async fn test_failed_cast_aborts_replay() {
        let records = ["42", "abc"].iter().map(|v| row("items", "qty", v)).collect();
        let mut preview = StreamSetPreview::from_summaries(
            "items",
            vec![MemoryStreamSummary::records("items", records).into_arc()],
        );
        let schemas = discover(&mut preview).await;

        let policy = DeconflictPolicy::new().with(
            "items",
            "qty",
            DeconflictOption::Cast(ValueKind::Integer),
        );
        let stream = replay(
            preview,
            Box::new(NoReplayEvents),
            schemas,
            None,
            Some(policy),
            ReplayConfig::default(),
        );
        let err = drain(stream).await.unwrap_err();
        assert!(matches!(err, StreamError::UnsupportedConversion(_)));
    }
}

mod event_tests {
    use super::*;

    struct SharedLog(Arc<Mutex<Vec<String>>>);

    impl ReplayEvents for SharedLog {
        fn on_stream_start(&mut self, stream_name: &str) {
            self.0.lock().unwrap().push(format!("start {stream_name}"));
        }

        fn on_bytes(&mut self, _stream_name: &str, bytes_read: u64) {
            self.0.lock().unwrap().push(format!("bytes {bytes_read}"));
        }

        fn on_stream_end(&mut self, stream_name: &str, records: u64) {
            self.0.lock().unwrap().push(format!("end {stream_name} {records}"));
        }
    }

    #[tokio::test]
    async fn test_events_follow_streams() {
        let mut preview = StreamSetPreview::from_summaries(
            "set",
            vec![
                MemoryStreamSummary::csv("one.csv", "rows", "v\n1\n2\n", 100).into_arc(),
                MemoryStreamSummary::records("two", vec![row("rows", "v", "3")]).into_arc(),
            ],
        );
        let schemas = discover(&mut preview).await;

        let log = Arc::new(Mutex::new(Vec::new()));
        let stream = replay(
            preview,
            Box::new(SharedLog(log.clone())),
            schemas,
            None,
            None,
            ReplayConfig::default(),
        );
        let out = replayed(&drain(stream).await.unwrap());
        assert_eq!(out.len(), 3);

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec!["start one.csv", "bytes 8", "end one.csv 2", "start two", "end two 1"]
        );
    }

    #[tokio::test]
    async fn test_dropping_the_stream_stops_replay() {
        let records = (0..1000).map(|n| row("rows", "n", &n.to_string())).collect();
        let mut preview = StreamSetPreview::from_summaries(
            "set",
            vec![MemoryStreamSummary::records("rows", records).into_arc()],
        );
        let schemas = discover(&mut preview).await;

        let config = ReplayConfig::builder().batch_size(10).channel_capacity(1).build();
        let mut stream = replay(preview, Box::new(NoReplayEvents), schemas, None, None, config);
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.records.len(), 10);
        drop(stream);
    }
}
