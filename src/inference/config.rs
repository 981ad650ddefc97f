//! Configuration for inspection and replay runs

use serde::{Deserialize, Serialize};

use crate::models::UpdateMethod;

/// Configuration for schema discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionConfig {
    /// Records past this count are only counted, not inspected
    pub max_inspect_records: u64,

    /// Discovery is finalized early once this many records were counted
    pub max_count_records: u64,

    /// Records per batch handed to the stats stage
    pub batch_size: usize,

    /// Sample records kept per schema
    pub sample_record_limit: usize,

    /// Distinct values tracked per value-type bucket before the histogram is dropped
    pub string_options_limit: usize,

    /// Period of the progress ticker in milliseconds
    pub progress_interval_ms: u64,
}

impl Default for InspectionConfig {
    fn default() -> Self {
        Self {
            max_inspect_records: 50_000,
            max_count_records: 250_000,
            batch_size: 1000,
            sample_record_limit: 100,
            string_options_limit: 50,
            progress_interval_ms: 1000,
        }
    }
}

impl InspectionConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for custom configuration
    pub fn builder() -> InspectionConfigBuilder {
        InspectionConfigBuilder::default()
    }
}

/// Builder for InspectionConfig
#[derive(Debug, Default)]
pub struct InspectionConfigBuilder {
    config: InspectionConfig,
}

impl InspectionConfigBuilder {
    pub fn max_inspect_records(mut self, max: u64) -> Self {
        self.config.max_inspect_records = max;
        self
    }

    pub fn max_count_records(mut self, max: u64) -> Self {
        self.config.max_count_records = max;
        self
    }

    /// Set the batch size (at least 1)
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size.max(1);
        self
    }

    pub fn sample_record_limit(mut self, limit: usize) -> Self {
        self.config.sample_record_limit = limit;
        self
    }

    pub fn string_options_limit(mut self, limit: usize) -> Self {
        self.config.string_options_limit = limit;
        self
    }

    /// Set the progress period (at least 1ms)
    pub fn progress_interval_ms(mut self, ms: u64) -> Self {
        self.config.progress_interval_ms = ms.max(1);
        self
    }

    /// Build the configuration
    ///
    /// The count ceiling is raised to the inspect ceiling if it was set lower.
    pub fn build(mut self) -> InspectionConfig {
        if self.config.max_count_records < self.config.max_inspect_records {
            self.config.max_count_records = self.config.max_inspect_records;
        }
        self.config
    }
}

/// Configuration for record replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayConfig {
    /// Records per emitted batch
    pub batch_size: usize,

    /// Batches buffered between the replay task and its consumer
    pub channel_capacity: usize,

    pub update_method: UpdateMethod,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            channel_capacity: 4,
            update_method: UpdateMethod::AppendOnlyLog,
        }
    }
}

impl ReplayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ReplayConfigBuilder {
        ReplayConfigBuilder::default()
    }
}

/// Builder for ReplayConfig
#[derive(Debug, Default)]
pub struct ReplayConfigBuilder {
    config: ReplayConfig,
}

impl ReplayConfigBuilder {
    /// Set the batch size (at least 1)
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size.max(1);
        self
    }

    /// Set the channel capacity (at least 1)
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity.max(1);
        self
    }

    pub fn update_method(mut self, method: UpdateMethod) -> Self {
        self.config.update_method = method;
        self
    }

    pub fn build(self) -> ReplayConfig {
        self.config
    }
}
