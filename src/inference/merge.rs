//! Type and format reconciliation
//!
//! Collapses the value types and format tags seen for one field into the minimal set
//! exposed on the finalized schema. `"0"`/`"1"` values (binary) are assumed numeric when
//! the field also holds numbers, and boolean otherwise.

use std::collections::BTreeMap;

use crate::models::{ValueFormat, ValueType, ValueTypeStatistics};

/// Format pairs where the first tag is dropped when both are present
const MERGEABLE_FORMATS: [(ValueFormat, ValueFormat); 4] = [
    (ValueFormat::Date, ValueFormat::DateTime),
    (ValueFormat::Binary, ValueFormat::Boolean),
    (ValueFormat::Binary, ValueFormat::Integer),
    (ValueFormat::Binary, ValueFormat::Number),
];

/// Merge the value types seen for a field
///
/// Dates fold into `string` (the format list keeps `date`/`date-time`), binary folds into
/// `number` if present and otherwise into `boolean`. The result is de-duplicated and sorted.
pub fn merge_value_types(types: &[ValueType]) -> Vec<ValueType> {
    let has_number = types.contains(&ValueType::Number);

    let mut merged: Vec<ValueType> = types
        .iter()
        .map(|t| match t {
            ValueType::Date => ValueType::String,
            ValueType::Binary if has_number => ValueType::Number,
            ValueType::Binary => ValueType::Boolean,
            other => *other,
        })
        .collect();

    merged.sort();
    merged.dedup();
    merged
}

/// Merge the format tags seen for a field
pub fn merge_value_formats<S: AsRef<str>>(formats: &[S]) -> Vec<String> {
    let mut merged: Vec<&str> = formats.iter().map(AsRef::as_ref).collect();

    for (first, second) in MERGEABLE_FORMATS {
        if merged.contains(&first.as_str()) && merged.contains(&second.as_str()) {
            merged.retain(|f| *f != first.as_str());
        }
    }

    let mut merged: Vec<String> = merged
        .into_iter()
        .map(|f| {
            if f == ValueFormat::Binary.as_str() {
                ValueFormat::Boolean.as_str().to_string()
            } else {
                f.to_string()
            }
        })
        .collect();

    merged.sort();
    merged.dedup();
    merged
}

/// Fold the binary statistics bucket into `number`, `boolean`, or rename it to `boolean`
///
/// When merging into `number`, the binary bucket's option histogram supplies the numeric
/// values for the min/max range.
pub fn merge_value_type_stats(
    stats: &mut BTreeMap<ValueType, ValueTypeStatistics>,
    options_limit: usize,
) {
    let Some(binary) = stats.remove(&ValueType::Binary) else {
        return;
    };

    if let Some(number) = stats.get_mut(&ValueType::Number) {
        let mut as_number = binary;
        let observed: Vec<f64> = match &as_number.string_options {
            Some(options) => options
                .keys()
                .filter_map(|k| k.trim().parse::<f64>().ok())
                .collect(),
            None => vec![0.0, 1.0],
        };
        for n in observed {
            as_number.observe_number(n);
        }
        number.merge_from(&as_number, options_limit);
    } else if let Some(boolean) = stats.get_mut(&ValueType::Boolean) {
        boolean.merge_from(&binary, options_limit);
    } else {
        stats.insert(ValueType::Boolean, binary);
    }
}
