//! Discovered schemas, properties and per-type statistics

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value::{Record, Value};

/// Semantic type of a field value
///
/// Variants are declared alphabetically so the derived ordering matches the
/// ordering of the external type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Array,
    /// `"0"`/`"1"` strings, ambiguous between boolean and number until finalization
    Binary,
    Boolean,
    Date,
    Null,
    Number,
    Object,
    String,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Array => "array",
            ValueType::Binary => "binary",
            ValueType::Boolean => "boolean",
            ValueType::Date => "date",
            ValueType::Null => "null",
            ValueType::Number => "number",
            ValueType::Object => "object",
            ValueType::String => "string",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-format of a discovered value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueFormat {
    Binary,
    Boolean,
    Date,
    DateTime,
    Integer,
    Number,
}

impl ValueFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueFormat::Binary => "binary",
            ValueFormat::Boolean => "boolean",
            ValueFormat::Date => "date",
            ValueFormat::DateTime => "date-time",
            ValueFormat::Integer => "integer",
            ValueFormat::Number => "number",
        }
    }
}

impl std::fmt::Display for ValueFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a single value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredType {
    pub value_type: ValueType,
    pub format: Option<ValueFormat>,
}

impl DiscoveredType {
    pub fn new(value_type: ValueType, format: Option<ValueFormat>) -> Self {
        Self { value_type, format }
    }

    pub fn plain(value_type: ValueType) -> Self {
        Self::new(value_type, None)
    }
}

/// Qualifier for counts that may be incomplete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CountPrecision {
    #[default]
    Exact,
    Approximate,
    GreaterThan,
}

/// A label assigned to a property by a content detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentLabel {
    pub label: String,
    pub applied_by_content_detector: bool,
    pub hidden: bool,
    pub value_tested_count: u64,
    pub occurrences_count: u64,
}

/// Statistics for one (field, value type) pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueTypeStatistics {
    pub record_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_min_value: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_max_value: Option<DateTime<Utc>>,
    /// Value histogram; `None` once it grew past the configured limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_options: Option<BTreeMap<String, u64>>,
}

impl Default for ValueTypeStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueTypeStatistics {
    pub fn new() -> Self {
        Self {
            record_count: 0,
            number_min_value: None,
            number_max_value: None,
            string_min_length: None,
            string_max_length: None,
            date_min_value: None,
            date_max_value: None,
            string_options: Some(BTreeMap::new()),
        }
    }

    /// Account for one observed value
    ///
    /// `raw` is the value as the source produced it (used for the option histogram and
    /// string lengths), `converted` its canonical form for the discovered type.
    pub fn update(&mut self, raw: &str, converted: &Value, options_limit: usize) {
        self.record_count += 1;

        match converted {
            Value::Integer(_) | Value::BigInteger(_) | Value::Number(_) => {
                if let Some(n) = converted.as_f64() {
                    self.observe_number(n);
                }
            }
            Value::String(s) => self.observe_length(s.chars().count()),
            Value::Date(d) => self.observe_date(*d),
            _ => {}
        }

        self.record_option(raw, 1, options_limit);
    }

    pub fn observe_number(&mut self, n: f64) {
        self.number_min_value = Some(self.number_min_value.map_or(n, |m| m.min(n)));
        self.number_max_value = Some(self.number_max_value.map_or(n, |m| m.max(n)));
    }

    fn observe_length(&mut self, len: usize) {
        self.string_min_length = Some(self.string_min_length.map_or(len, |m| m.min(len)));
        self.string_max_length = Some(self.string_max_length.map_or(len, |m| m.max(len)));
    }

    fn observe_date(&mut self, d: DateTime<Utc>) {
        self.date_min_value = Some(self.date_min_value.map_or(d, |m| m.min(d)));
        self.date_max_value = Some(self.date_max_value.map_or(d, |m| m.max(d)));
    }

    /// Add `count` occurrences of `key`; drops the histogram for good once it exceeds `limit`
    pub fn record_option(&mut self, key: &str, count: u64, limit: usize) {
        let Some(options) = self.string_options.as_mut() else {
            return;
        };
        *options.entry(key.to_string()).or_insert(0) += count;
        if options.len() > limit {
            self.string_options = None;
        }
    }

    /// Fold another bucket for the same field into this one
    pub fn merge_from(&mut self, other: &ValueTypeStatistics, options_limit: usize) {
        self.record_count += other.record_count;

        if let Some(n) = other.number_min_value {
            self.observe_number(n);
        }
        if let Some(n) = other.number_max_value {
            self.observe_number(n);
        }
        if let Some(len) = other.string_min_length {
            self.observe_length(len);
        }
        if let Some(len) = other.string_max_length {
            self.observe_length(len);
        }
        if let Some(d) = other.date_min_value {
            self.observe_date(d);
        }
        if let Some(d) = other.date_max_value {
            self.observe_date(d);
        }

        match &other.string_options {
            Some(options) => {
                for (key, count) in options {
                    self.record_option(key, *count, options_limit);
                }
            }
            None => self.string_options = None,
        }
    }
}

/// Kinds a field value can be cast between during replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueKind {
    Boolean,
    Integer,
    Number,
    String,
    Date,
    DateTime,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Boolean => "boolean",
            ValueKind::Integer => "integer",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Date => "date",
            ValueKind::DateTime => "date-time",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The discovered shape of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    /// Output name of the field; differs from the map key when the field is renamed
    pub title: String,
    pub record_count: u64,
    pub records_not_present: u64,
    pub value_types: BTreeMap<ValueType, ValueTypeStatistics>,
    /// Consolidated type set, assigned at finalization
    #[serde(rename = "type", default)]
    pub types: Vec<ValueType>,
    /// Comma-joined format tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_labels: Vec<ContentLabel>,
}

impl Property {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            record_count: 0,
            records_not_present: 0,
            value_types: BTreeMap::new(),
            types: Vec::new(),
            format: None,
            hidden: false,
            content_labels: Vec::new(),
        }
    }

    /// Format tags as a list
    pub fn formats(&self) -> Vec<&str> {
        self.format
            .as_deref()
            .map(|f| f.split(',').filter(|t| !t.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Add a format tag unless it is already present
    pub fn add_format(&mut self, format: ValueFormat) {
        let token = format.as_str();
        match &mut self.format {
            Some(existing) => {
                if !existing.split(',').any(|t| t == token) {
                    existing.push(',');
                    existing.push_str(token);
                }
            }
            None => self.format = Some(token.to_string()),
        }
    }

    pub fn has_type(&self, value_type: ValueType) -> bool {
        self.types.contains(&value_type)
    }

    /// Distinct castable kinds observed for this field
    ///
    /// Meaningful after finalization; null, array and object buckets do not contribute.
    pub fn value_kinds(&self) -> BTreeSet<ValueKind> {
        let formats = self.formats();
        let has_format = |f: ValueFormat| formats.contains(&f.as_str());
        let mut kinds = BTreeSet::new();

        for value_type in self.value_types.keys() {
            match value_type {
                ValueType::Boolean | ValueType::Binary => {
                    kinds.insert(ValueKind::Boolean);
                }
                ValueType::Number => {
                    if has_format(ValueFormat::Integer) {
                        kinds.insert(ValueKind::Integer);
                    }
                    if has_format(ValueFormat::Number) || !has_format(ValueFormat::Integer) {
                        kinds.insert(ValueKind::Number);
                    }
                }
                ValueType::String => {
                    kinds.insert(ValueKind::String);
                }
                ValueType::Date => {
                    if has_format(ValueFormat::Date) {
                        kinds.insert(ValueKind::Date);
                    }
                    if has_format(ValueFormat::DateTime) || !has_format(ValueFormat::Date) {
                        kinds.insert(ValueKind::DateTime);
                    }
                }
                ValueType::Null | ValueType::Array | ValueType::Object => {}
            }
        }

        kinds
    }

    /// True when the field was seen with more than one castable kind
    pub fn is_conflicted(&self) -> bool {
        self.value_kinds().len() > 1
    }
}

/// The discovered shape of one kind of record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub title: String,
    /// Keyed by the field name as it appears in source records
    pub properties: BTreeMap<String, Property>,
    pub record_count: u64,
    pub records_inspected_count: u64,
    #[serde(default)]
    pub record_count_precision: CountPrecision,
    #[serde(default)]
    pub sample_records: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Schema {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            properties: BTreeMap::new(),
            record_count: 0,
            records_inspected_count: 0,
            record_count_precision: CountPrecision::Exact,
            sample_records: Vec::new(),
            unit: None,
        }
    }

    /// Hide a field from replayed records
    pub fn hide_property(&mut self, field: &str) -> bool {
        match self.properties.get_mut(field) {
            Some(property) => {
                property.hidden = true;
                true
            }
            None => false,
        }
    }

    /// Rename a field in replayed records
    pub fn rename_property(&mut self, field: &str, title: impl Into<String>) -> bool {
        match self.properties.get_mut(field) {
            Some(property) => {
                property.title = title.into();
                true
            }
            None => false,
        }
    }

    /// Convert to a JSON Schema (draft 2020-12) document
    ///
    /// Hidden properties are omitted and renamed ones appear under their new title.
    pub fn to_json_schema(&self) -> serde_json::Value {
        let mut schema = serde_json::json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "title": self.title,
            "type": "object",
        });

        let mut props = serde_json::Map::new();
        let mut required = Vec::new();

        for (field, property) in &self.properties {
            if property.hidden {
                continue;
            }

            let mut type_names: Vec<&str> = Vec::new();
            for value_type in &property.types {
                let name = match value_type {
                    ValueType::Number
                        if property.formats() == vec![ValueFormat::Integer.as_str()] =>
                    {
                        "integer"
                    }
                    ValueType::Binary => "boolean",
                    ValueType::Date => "string",
                    other => other.as_str(),
                };
                if !type_names.contains(&name) {
                    type_names.push(name);
                }
            }

            let mut prop_schema = serde_json::json!({});
            match type_names.as_slice() {
                [] => {}
                [single] => prop_schema["type"] = serde_json::json!(single),
                many => prop_schema["type"] = serde_json::json!(many),
            }

            let formats = property.formats();
            if formats.contains(&ValueFormat::DateTime.as_str()) {
                prop_schema["format"] = serde_json::json!("date-time");
            } else if formats.contains(&ValueFormat::Date.as_str()) {
                prop_schema["format"] = serde_json::json!("date");
            }

            let examples: Vec<serde_json::Value> = self
                .sample_records
                .iter()
                .filter_map(|r| r.get(field))
                .filter(|v| !v.is_null())
                .take(3)
                .map(Value::to_json)
                .collect();
            if !examples.is_empty() {
                prop_schema["examples"] = serde_json::Value::Array(examples);
            }

            if property.records_not_present == 0 && !property.has_type(ValueType::Null) {
                required.push(serde_json::Value::String(property.title.clone()));
            }

            props.insert(property.title.clone(), prop_schema);
        }

        schema["properties"] = serde_json::Value::Object(props);
        if !required.is_empty() {
            schema["required"] = serde_json::Value::Array(required);
        }

        schema
    }
}
