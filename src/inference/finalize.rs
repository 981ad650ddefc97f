//! Schema finalization
//!
//! Turns accumulated statistics into the externally visible schema shape. Runs once per
//! schema after accumulation ends; finalized schemas are not mutated afterwards.

use std::collections::BTreeMap;

use crate::models::{CountPrecision, Schema, Value, ValueType};

use super::config::InspectionConfig;
use super::labels::ContentLabelDetector;
use super::merge::{merge_value_formats, merge_value_type_stats, merge_value_types};

/// Finalize one schema in place
pub fn finalize_schema(
    schema: &mut Schema,
    precision: CountPrecision,
    detector: &dyn ContentLabelDetector,
    config: &InspectionConfig,
) {
    let inspected = schema.records_inspected_count;

    for (field, property) in schema.properties.iter_mut() {
        let seen: Vec<ValueType> = property.value_types.keys().copied().collect();
        property.types = merge_value_types(&seen);

        let formats = merge_value_formats(&property.formats());
        property.format = if formats.is_empty() {
            None
        } else {
            Some(formats.join(","))
        };

        merge_value_type_stats(&mut property.value_types, config.string_options_limit);
        property.records_not_present = inspected.saturating_sub(property.record_count);

        property.content_labels = detector.labels_for(&schema.title, field);
        if property.content_labels.iter().any(|l| l.hidden) {
            property.hidden = true;
        }
    }

    // 0/1 samples were read as booleans; when the field settled on numbers they go back to 0/1
    for record in schema.sample_records.iter_mut() {
        for (field, value) in record.iter_mut() {
            let Value::Boolean(b) = *value else {
                continue;
            };
            let numeric = schema
                .properties
                .get(field)
                .is_some_and(|p| !p.has_type(ValueType::Boolean));
            if numeric {
                *value = Value::Integer(i64::from(b));
            }
        }
    }

    schema.record_count_precision = precision;
}

/// Finalize every accumulated schema, ordered by title
pub fn finalize_schemas(
    schemas: BTreeMap<String, Schema>,
    precision: CountPrecision,
    detector: &dyn ContentLabelDetector,
    config: &InspectionConfig,
) -> Vec<Schema> {
    schemas
        .into_values()
        .map(|mut schema| {
            finalize_schema(&mut schema, precision, detector, config);
            schema
        })
        .collect()
}
