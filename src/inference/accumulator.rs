//! Stats stage: per-schema accumulation of value-type statistics

use std::collections::BTreeMap;

use crate::models::{Property, Record, RecordContext, Schema, ValueTypeStatistics};

use super::classify::classify;
use super::config::InspectionConfig;
use super::convert::to_canonical;
use super::error::InferenceError;
use super::labels::{ContentLabelDetector, NoopContentLabelDetector};

/// What the stats stage should do with the next record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressDirective {
    /// Accumulate full field statistics
    Inspect,
    /// Only count the record
    Count,
    /// Stop; the record and everything after it is discarded
    End,
}

/// Result of processing one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsOutcome {
    Continue,
    Ended,
}

/// Accumulates schemas from batches of records
///
/// The stage observes batches without consuming them. Each record is preceded by a call
/// to the caller's directive function, which decides between full inspection, counting
/// only, or ending the stage.
pub struct StatsStage {
    schemas: BTreeMap<String, Schema>,
    detector: Box<dyn ContentLabelDetector>,
    sample_record_limit: usize,
    string_options_limit: usize,
    ended: bool,
}

impl std::fmt::Debug for StatsStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsStage")
            .field("schemas", &self.schemas.keys().collect::<Vec<_>>())
            .field("ended", &self.ended)
            .finish()
    }
}

impl StatsStage {
    pub fn new(config: &InspectionConfig) -> Self {
        Self::with_detector(config, Box::new(NoopContentLabelDetector))
    }

    pub fn with_detector(
        config: &InspectionConfig,
        detector: Box<dyn ContentLabelDetector>,
    ) -> Self {
        Self {
            schemas: BTreeMap::new(),
            detector,
            sample_record_limit: config.sample_record_limit,
            string_options_limit: config.string_options_limit,
            ended: false,
        }
    }

    /// Process one batch
    ///
    /// Returns [`StatsOutcome::Ended`] as soon as `directive` answers
    /// [`ProgressDirective::End`]; later calls are no-ops that keep returning `Ended`.
    pub fn process_batch<F>(
        &mut self,
        batch: &[RecordContext],
        mut directive: F,
    ) -> Result<StatsOutcome, InferenceError>
    where
        F: FnMut(&RecordContext) -> ProgressDirective,
    {
        if self.ended {
            return Ok(StatsOutcome::Ended);
        }

        for ctx in batch {
            match directive(ctx) {
                ProgressDirective::Inspect => self.inspect_record(ctx)?,
                ProgressDirective::Count => {
                    self.schema_mut(&ctx.schema_slug).record_count += 1;
                }
                ProgressDirective::End => {
                    self.ended = true;
                    return Ok(StatsOutcome::Ended);
                }
            }
        }

        Ok(StatsOutcome::Continue)
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn schemas(&self) -> &BTreeMap<String, Schema> {
        &self.schemas
    }

    /// Hand over the accumulated schemas and the detector for finalization
    pub fn into_parts(self) -> (BTreeMap<String, Schema>, Box<dyn ContentLabelDetector>) {
        (self.schemas, self.detector)
    }

    fn schema_mut(&mut self, slug: &str) -> &mut Schema {
        self.schemas
            .entry(slug.to_string())
            .or_insert_with(|| Schema::new(slug))
    }

    fn inspect_record(&mut self, ctx: &RecordContext) -> Result<(), InferenceError> {
        let options_limit = self.string_options_limit;
        let schema = self
            .schemas
            .entry(ctx.schema_slug.clone())
            .or_insert_with(|| Schema::new(ctx.schema_slug.as_str()));

        schema.record_count += 1;
        schema.records_inspected_count += 1;

        let mut converted_record = Record::with_capacity(ctx.record.len());
        for (field, value) in &ctx.record {
            let property = schema
                .properties
                .entry(field.clone())
                .or_insert_with(|| Property::new(field.as_str()));
            property.record_count += 1;

            let discovered = classify(value);
            if let Some(format) = discovered.format {
                property.add_format(format);
            }

            let converted = to_canonical(value, discovered)?;
            if !converted.is_null() {
                self.detector.inspect_value(&schema.title, field, value, &converted);
            }

            property
                .value_types
                .entry(discovered.value_type)
                .or_insert_with(ValueTypeStatistics::new)
                .update(&value.to_string(), &converted, options_limit);

            converted_record.insert(field.clone(), converted);
        }

        if schema.sample_records.len() < self.sample_record_limit {
            schema.sample_records.push(converted_record);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordContext, Value, ValueType};

    fn ctx(pairs: &[(&str, &str)]) -> RecordContext {
        RecordContext::from_pairs("rows", pairs.iter().copied())
    }

    #[test]
    fn test_inspect_accumulates_properties() {
        let mut stage = StatsStage::new(&InspectionConfig::default());
        let batch = vec![
            ctx(&[("id", "1"), ("name", "Alice")]),
            ctx(&[("id", "2"), ("name", "Bob")]),
            ctx(&[("id", "3")]),
        ];

        let outcome = stage
            .process_batch(&batch, |_| ProgressDirective::Inspect)
            .unwrap();
        assert_eq!(outcome, StatsOutcome::Continue);

        let schema = &stage.schemas()["rows"];
        assert_eq!(schema.record_count, 3);
        assert_eq!(schema.records_inspected_count, 3);
        assert_eq!(schema.sample_records.len(), 3);

        let id = &schema.properties["id"];
        assert_eq!(id.record_count, 3);
        assert!(id.value_types.contains_key(&ValueType::Binary));
        assert!(id.value_types.contains_key(&ValueType::Number));
        assert_eq!(id.format.as_deref(), Some("binary,integer"));

        assert_eq!(schema.properties["name"].record_count, 2);
        assert_eq!(schema.sample_records[0]["id"], Value::Boolean(true));
        assert_eq!(schema.sample_records[1]["id"], Value::Integer(2));
    }

    #[test]
    fn test_count_directive_skips_field_statistics() {
        let mut stage = StatsStage::new(&InspectionConfig::default());
        let batch = vec![ctx(&[("a", "x")]), ctx(&[("a", "y")])];

        stage
            .process_batch(&batch, |_| ProgressDirective::Count)
            .unwrap();

        let schema = &stage.schemas()["rows"];
        assert_eq!(schema.record_count, 2);
        assert_eq!(schema.records_inspected_count, 0);
        assert!(schema.properties.is_empty());
        assert!(schema.sample_records.is_empty());
    }

    #[test]
    fn test_end_directive_stops_stage() {
        let mut stage = StatsStage::new(&InspectionConfig::default());
        let batch: Vec<_> = (0..5).map(|i| ctx(&[("n", i.to_string().as_str())])).collect();

        let mut seen = 0;
        let outcome = stage
            .process_batch(&batch, |_| {
                seen += 1;
                if seen > 2 {
                    ProgressDirective::End
                } else {
                    ProgressDirective::Inspect
                }
            })
            .unwrap();

        assert_eq!(outcome, StatsOutcome::Ended);
        assert!(stage.is_ended());
        assert_eq!(stage.schemas()["rows"].record_count, 2);

        let again = stage
            .process_batch(&batch, |_| ProgressDirective::Inspect)
            .unwrap();
        assert_eq!(again, StatsOutcome::Ended);
        assert_eq!(stage.schemas()["rows"].record_count, 2);
    }

    #[test]
    fn test_sample_buffer_is_capped() {
        let config = InspectionConfig::builder().sample_record_limit(100).build();
        let mut stage = StatsStage::new(&config);
        let batch: Vec<_> = (0..250).map(|i| ctx(&[("n", i.to_string().as_str())])).collect();

        stage
            .process_batch(&batch, |_| ProgressDirective::Inspect)
            .unwrap();

        let schema = &stage.schemas()["rows"];
        assert_eq!(schema.sample_records.len(), 100);
        assert_eq!(schema.record_count, 250);
    }

    #[test]
    fn test_schemas_are_keyed_by_slug() {
        let mut stage = StatsStage::new(&InspectionConfig::default());
        let batch = vec![
            RecordContext::from_pairs("a", [("x", "1")]),
            RecordContext::from_pairs("b", [("y", "2")]),
            RecordContext::from_pairs("a", [("x", "3")]),
        ];
        stage
            .process_batch(&batch, |_| ProgressDirective::Inspect)
            .unwrap();

        assert_eq!(stage.schemas().len(), 2);
        assert_eq!(stage.schemas()["a"].record_count, 2);
        assert_eq!(stage.schemas()["b"].title, "b");
    }
}
