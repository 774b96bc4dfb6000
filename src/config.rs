use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::cache::{CacheConfig, CachePolicy};
use crate::custom::ProcessEvaluatorConfig;

/// Engine configuration. Every field has a default, so an empty TOML file or
/// an empty environment yields a working setup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub execution_cache_ttl_secs: u64,
    pub execution_cache_max_entries: usize,
    pub metadata_cache_ttl_secs: u64,
    pub metadata_cache_max_entries: usize,
    pub dashboard_cache_ttl_secs: u64,
    pub dashboard_cache_max_entries: usize,
    /// Rows kept per cached node result.
    pub node_result_row_limit: usize,
    /// Rows kept per cached leaf result.
    pub leaf_result_row_limit: usize,
    pub cache_sweep_interval_secs: u64,
    /// Page size used for the single fetch a data source node performs.
    pub data_source_page_size: usize,
    /// Deadline for a whole pipeline run. `None` or `0` disables it.
    pub execution_timeout_secs: Option<u64>,
    pub custom_code_command: String,
    pub custom_code_timeout_ms: u64,
    pub custom_code_memory_mb: u64,
    pub custom_code_max_output_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            execution_cache_ttl_secs: 300,
            execution_cache_max_entries: 100,
            metadata_cache_ttl_secs: 600,
            metadata_cache_max_entries: 500,
            dashboard_cache_ttl_secs: 120,
            dashboard_cache_max_entries: 200,
            node_result_row_limit: 1_000,
            leaf_result_row_limit: 500,
            cache_sweep_interval_secs: 60,
            data_source_page_size: 10_000,
            execution_timeout_secs: None,
            custom_code_command: "node".to_string(),
            custom_code_timeout_ms: 5_000,
            custom_code_memory_mb: 128,
            custom_code_max_output_bytes: 10 * 1024 * 1024,
        }
    }
}

impl EngineConfig {
    const ENV_PREFIX: &'static str = "ROWDAG_";

    /// Defaults overridden by `ROWDAG_*` environment variables.
    pub fn from_env() -> Self {
        let values: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with(Self::ENV_PREFIX))
            .collect();
        Self::from_map(&values)
    }

    /// Defaults overridden by `ROWDAG_*` keys from `values`.
    pub fn from_map(values: &HashMap<String, String>) -> Self {
        Self::default().with_overrides(values)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse engine configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Applies `ROWDAG_*` overrides on top of this configuration. Blank values
    /// are ignored; unparsable ones are logged and ignored.
    pub fn with_overrides(mut self, values: &HashMap<String, String>) -> Self {
        fn read<T: FromStr>(values: &HashMap<String, String>, key: &str, target: &mut T) {
            let Some(raw) = values.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
                return;
            };
            match raw.parse() {
                Ok(parsed) => *target = parsed,
                Err(_) => warn!("Ignoring invalid value '{}' for {}", raw, key),
            }
        }

        read(values, "ROWDAG_EXECUTION_CACHE_TTL_SECS", &mut self.execution_cache_ttl_secs);
        read(
            values,
            "ROWDAG_EXECUTION_CACHE_MAX_ENTRIES",
            &mut self.execution_cache_max_entries,
        );
        read(values, "ROWDAG_METADATA_CACHE_TTL_SECS", &mut self.metadata_cache_ttl_secs);
        read(
            values,
            "ROWDAG_METADATA_CACHE_MAX_ENTRIES",
            &mut self.metadata_cache_max_entries,
        );
        read(values, "ROWDAG_DASHBOARD_CACHE_TTL_SECS", &mut self.dashboard_cache_ttl_secs);
        read(
            values,
            "ROWDAG_DASHBOARD_CACHE_MAX_ENTRIES",
            &mut self.dashboard_cache_max_entries,
        );
        read(values, "ROWDAG_NODE_RESULT_ROW_LIMIT", &mut self.node_result_row_limit);
        read(values, "ROWDAG_LEAF_RESULT_ROW_LIMIT", &mut self.leaf_result_row_limit);
        read(values, "ROWDAG_CACHE_SWEEP_INTERVAL_SECS", &mut self.cache_sweep_interval_secs);
        read(values, "ROWDAG_DATA_SOURCE_PAGE_SIZE", &mut self.data_source_page_size);
        read(values, "ROWDAG_CUSTOM_CODE_COMMAND", &mut self.custom_code_command);
        read(values, "ROWDAG_CUSTOM_CODE_TIMEOUT_MS", &mut self.custom_code_timeout_ms);
        read(values, "ROWDAG_CUSTOM_CODE_MEMORY_MB", &mut self.custom_code_memory_mb);
        read(
            values,
            "ROWDAG_CUSTOM_CODE_MAX_OUTPUT_BYTES",
            &mut self.custom_code_max_output_bytes,
        );

        // 0 turns the deadline off
        let mut timeout = self.execution_timeout_secs.unwrap_or(0);
        read(values, "ROWDAG_EXECUTION_TIMEOUT_SECS", &mut timeout);
        self.execution_timeout_secs = (timeout > 0).then_some(timeout);

        self
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            executions: CachePolicy::new(
                Duration::from_secs(self.execution_cache_ttl_secs),
                self.execution_cache_max_entries,
            ),
            metadata: CachePolicy::new(
                Duration::from_secs(self.metadata_cache_ttl_secs),
                self.metadata_cache_max_entries,
            ),
            dashboard: CachePolicy::new(
                Duration::from_secs(self.dashboard_cache_ttl_secs),
                self.dashboard_cache_max_entries,
            ),
            node_row_limit: self.node_result_row_limit,
            leaf_row_limit: self.leaf_result_row_limit,
            sweep_interval: Duration::from_secs(self.cache_sweep_interval_secs.max(1)),
        }
    }

    pub fn custom_code(&self) -> ProcessEvaluatorConfig {
        ProcessEvaluatorConfig {
            command: self.custom_code_command.clone(),
            timeout: Duration::from_millis(self.custom_code_timeout_ms),
            memory_mb: self.custom_code_memory_mb,
            max_output_bytes: self.custom_code_max_output_bytes,
        }
    }

    pub fn execution_timeout(&self) -> Option<Duration> {
        self.execution_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
