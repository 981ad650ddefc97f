//! Content label detection
//!
//! The stats stage hands every inspected value to a [`ContentLabelDetector`], both as read
//! from the source and converted to its discovered type. Labels are collected onto each
//! property when the schema is finalized.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{ContentLabel, Value};

/// Observes property values and proposes labels for them
pub trait ContentLabelDetector: Send {
    /// Called once per inspected, non-null value
    fn inspect_value(
        &mut self,
        schema_title: &str,
        property: &str,
        raw: &Value,
        converted: &Value,
    );

    /// Labels for a property, queried at finalization
    fn labels_for(&self, schema_title: &str, property: &str) -> Vec<ContentLabel>;
}

/// Detector that never labels anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopContentLabelDetector;

impl ContentLabelDetector for NoopContentLabelDetector {
    fn inspect_value(
        &mut self,
        _schema_title: &str,
        _property: &str,
        _raw: &Value,
        _converted: &Value,
    ) {
    }

    fn labels_for(&self, _schema_title: &str, _property: &str) -> Vec<ContentLabel> {
        Vec::new()
    }
}

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9]\d{6,14}$").unwrap());

static IPV4_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^((25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)$",
    )
    .unwrap()
});

#[derive(Debug, Default, Clone)]
struct LabelCounts {
    tested: u64,
    matches: HashMap<&'static str, u64>,
}

/// Labels string properties whose values mostly match well-known personal-data patterns
///
/// A label is applied when at least `threshold` of the tested values match. Values are tested
/// on their source text, so a phone number read as an integer is still recognized.
/// Labelled properties are marked hidden so replay drops them unless the caller unhides them.
#[derive(Debug, Clone)]
pub struct PatternContentLabelDetector {
    threshold: f64,
    hide_labelled: bool,
    counts: HashMap<(String, String), LabelCounts>,
}

impl Default for PatternContentLabelDetector {
    fn default() -> Self {
        Self::new(0.9)
    }
}

impl PatternContentLabelDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
            hide_labelled: true,
            counts: HashMap::new(),
        }
    }

    pub fn with_hide_labelled(mut self, hide: bool) -> Self {
        self.hide_labelled = hide;
        self
    }

    fn label_of(value: &str) -> Option<&'static str> {
        if EMAIL_REGEX.is_match(value) {
            Some("email")
        } else if PHONE_REGEX.is_match(value) {
            Some("phone")
        } else if IPV4_REGEX.is_match(value) {
            Some("ip-address")
        } else {
            None
        }
    }
}

impl ContentLabelDetector for PatternContentLabelDetector {
    fn inspect_value(
        &mut self,
        schema_title: &str,
        property: &str,
        raw: &Value,
        converted: &Value,
    ) {
        // Patterns match source text; "+49151..." converts to an integer
        let ((Value::String(s), _) | (_, Value::String(s))) = (raw, converted) else {
            return;
        };
        let counts = self
            .counts
            .entry((schema_title.to_string(), property.to_string()))
            .or_default();
        counts.tested += 1;
        if let Some(label) = Self::label_of(s.trim()) {
            *counts.matches.entry(label).or_insert(0) += 1;
        }
    }

    fn labels_for(&self, schema_title: &str, property: &str) -> Vec<ContentLabel> {
        let Some(counts) = self
            .counts
            .get(&(schema_title.to_string(), property.to_string()))
        else {
            return Vec::new();
        };
        if counts.tested == 0 {
            return Vec::new();
        }

        let mut labels: Vec<ContentLabel> = counts
            .matches
            .iter()
            .filter(|(_, hits)| **hits as f64 / counts.tested as f64 >= self.threshold)
            .map(|(label, hits)| ContentLabel {
                label: label.to_string(),
                applied_by_content_detector: true,
                hidden: self.hide_labelled,
                value_tested_count: counts.tested,
                occurrences_count: *hits,
            })
            .collect();
        labels.sort_by(|a, b| a.label.cmp(&b.label));
        labels
    }
}
