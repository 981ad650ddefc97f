//! Resolution of fields observed with conflicting value kinds

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::inference::{InferenceError, cast_to_kind, classify};
use crate::models::{Value, ValueFormat, ValueKind, ValueType};

/// One choice from a conflicted field's resolution menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", content = "kind", rename_all = "camelCase")]
pub enum DeconflictOption {
    /// Cast every value to the kind; a value that cannot be cast is an error
    Cast(ValueKind),
    /// Keep records whose value already is of the kind, drop the others
    Skip(ValueKind),
    /// Emit values unchanged
    Passthrough,
}

impl fmt::Display for DeconflictOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeconflictOption::Cast(kind) => write!(f, "cast to {kind}"),
            DeconflictOption::Skip(kind) => write!(f, "keep {kind} values, skip other records"),
            DeconflictOption::Passthrough => f.write_str("emit all types unchanged"),
        }
    }
}

/// Whether every value of kind `from` can be cast to kind `to`
pub fn can_cast(from: ValueKind, to: ValueKind) -> bool {
    use ValueKind::*;

    from == to
        || to == String
        || matches!(
            (from, to),
            (Boolean, Integer)
                | (Boolean, Number)
                | (Integer, Boolean)
                | (Number, Boolean)
                | (Integer, Number)
                | (Date, DateTime)
                | (DateTime, Date)
        )
}

/// Resolution menu for a field observed with the given kinds
///
/// Empty unless at least two kinds were observed. Casting to a kind is offered when every
/// other observed kind can be cast to it; keeping one kind and skipping the rest is always
/// offered; passing values through unchanged comes last.
pub fn deconflict_options(kinds: &BTreeSet<ValueKind>) -> Vec<DeconflictOption> {
    if kinds.len() < 2 {
        return Vec::new();
    }

    let mut options = Vec::with_capacity(kinds.len() * 2 + 1);
    for &kind in kinds {
        if kinds.iter().all(|&other| can_cast(other, kind)) {
            options.push(DeconflictOption::Cast(kind));
        }
        options.push(DeconflictOption::Skip(kind));
    }
    options.push(DeconflictOption::Passthrough);
    options
}

/// Apply a resolution to one value
///
/// Returns `Ok(None)` when the record holding the value must be skipped. Nulls are never
/// skipped.
pub fn resolve_conflict(
    value: &Value,
    option: &DeconflictOption,
) -> Result<Option<Value>, InferenceError> {
    match *option {
        DeconflictOption::Passthrough => Ok(Some(value.clone())),
        DeconflictOption::Cast(kind) => cast_to_kind(value, kind).map(Some),
        DeconflictOption::Skip(kind) => {
            if matches_kind(value, kind) {
                cast_to_kind(value, kind).map(Some)
            } else {
                Ok(None)
            }
        }
    }
}

/// Whether a value classifies as the kind
fn matches_kind(value: &Value, kind: ValueKind) -> bool {
    let discovered = classify(value);
    match discovered.value_type {
        ValueType::Null => true,
        ValueType::Binary => matches!(
            kind,
            ValueKind::Boolean | ValueKind::Integer | ValueKind::Number
        ),
        ValueType::Boolean => kind == ValueKind::Boolean,
        ValueType::Number => match kind {
            ValueKind::Integer => discovered.format == Some(ValueFormat::Integer),
            ValueKind::Number => true,
            _ => false,
        },
        ValueType::String => kind == ValueKind::String,
        ValueType::Date => match kind {
            ValueKind::String => matches!(value, Value::String(_)),
            ValueKind::Date => discovered.format == Some(ValueFormat::Date),
            ValueKind::DateTime => discovered.format == Some(ValueFormat::DateTime),
            _ => false,
        },
        ValueType::Array | ValueType::Object => false,
    }
}

/// Chosen resolutions, by schema title and field name
///
/// Field names are the names produced by the source, before any rename.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeconflictPolicy {
    schemas: BTreeMap<String, BTreeMap<String, DeconflictOption>>,
}

impl DeconflictPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        schema: impl Into<String>,
        field: impl Into<String>,
        option: DeconflictOption,
    ) {
        self.schemas
            .entry(schema.into())
            .or_default()
            .insert(field.into(), option);
    }

    pub fn with(
        mut self,
        schema: impl Into<String>,
        field: impl Into<String>,
        option: DeconflictOption,
    ) -> Self {
        self.set(schema, field, option);
        self
    }

    pub fn get(&self, schema: &str, field: &str) -> Option<&DeconflictOption> {
        self.schemas.get(schema).and_then(|fields| fields.get(field))
    }

    /// Resolutions for one schema
    pub fn for_schema(&self, schema: &str) -> Option<&BTreeMap<String, DeconflictOption>> {
        self.schemas.get(schema)
    }

    pub fn schemas(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, DeconflictOption>)> {
        self.schemas.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.values().all(BTreeMap::is_empty)
    }
}
