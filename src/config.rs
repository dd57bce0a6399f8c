use crate::error::{PipelineError, Result};
use crate::wait::WaitStrategyKind;
use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Sizing and tuning knobs of a pipeline.
///
/// Every field has a default, so a settings file only needs the values it
/// changes:
///
/// ```toml
/// ingress_capacity = 4096
/// filter_pool_size = 4
/// ingress_wait_strategy = "blocking"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Slots in the buffer producers submit into (power of two)
    pub ingress_capacity: usize,
    /// Slots between the filter and output stages (power of two)
    pub intermediate_capacity: usize,
    pub filter_pool_size: usize,
    pub output_pool_size: usize,
    /// How producers and filter workers wait on the ingress buffer
    pub ingress_wait_strategy: WaitStrategyKind,
    /// How filter and output workers wait on the intermediate buffer
    pub intermediate_wait_strategy: WaitStrategyKind,
    /// Upper bound of a single park of the blocking wait strategy
    pub max_park_ms: u64,
    /// Drain budget used when a running pipeline is dropped; 0 waits forever
    pub stop_timeout_ms: u64,
    pub throttle_high_watermark: u32,
    pub throttle_low_watermark: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            ingress_capacity: 1024,
            intermediate_capacity: 1024,
            filter_pool_size: 2,
            output_pool_size: 1,
            ingress_wait_strategy: WaitStrategyKind::Blocking,
            intermediate_wait_strategy: WaitStrategyKind::Blocking,
            max_park_ms: 50,
            stop_timeout_ms: 5_000,
            throttle_high_watermark: 80,
            throttle_low_watermark: 40,
        }
    }
}

impl PipelineSettings {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file; the format follows the file extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, capacity) in [
            ("ingress_capacity", self.ingress_capacity),
            ("intermediate_capacity", self.intermediate_capacity),
        ] {
            if capacity == 0 || !capacity.is_power_of_two() {
                return Err(PipelineError::InvalidConfig(format!(
                    "{field} must be a non-zero power of two, got {capacity}"
                )));
            }
        }
        for (field, pool_size) in [
            ("filter_pool_size", self.filter_pool_size),
            ("output_pool_size", self.output_pool_size),
        ] {
            if pool_size == 0 {
                return Err(PipelineError::InvalidConfig(format!("{field} must be at least 1")));
            }
        }
        if self.max_park_ms == 0 {
            return Err(PipelineError::InvalidConfig("max_park_ms must be at least 1".into()));
        }
        if self.throttle_low_watermark >= self.throttle_high_watermark || self.throttle_high_watermark > 100 {
            return Err(PipelineError::InvalidConfig(format!(
                "throttle watermarks must satisfy low < high <= 100, got low={} high={}",
                self.throttle_low_watermark, self.throttle_high_watermark
            )));
        }
        Ok(())
    }

    pub fn max_park(&self) -> Duration {
        Duration::from_millis(self.max_park_ms)
    }

    pub fn stop_timeout(&self) -> Option<Duration> {
        (self.stop_timeout_ms > 0).then(|| Duration::from_millis(self.stop_timeout_ms))
    }
}
