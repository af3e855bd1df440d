//! Runtime configuration from environment variables.
//!
//! Every tunable the runtime recognizes, with its variable name and
//! default. CLI flags may override individual fields after loading.

use std::time::Duration;

use chronus_core::MAX_BLOCK_SIZE;

use crate::error::ConfigError;

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// `BUFFER_SIZE`: block size B in samples.
    pub block_size: usize,
    /// `SAMPLE_RATE`: sample rate in Hz.
    pub sample_rate: u32,
    /// `NUM_BUFFERS`: audio ring buffer budget per slot.
    pub num_buffers: usize,
    /// `LEAD_TARGET`: worker stops producing at this ring occupancy.
    pub lead_target: usize,
    /// `MAX_CATCHUP`: max blocks produced per loop iteration.
    pub max_catchup: u32,
    /// `EARLY_MARGIN_MS`: deadline margin for the anchored scheduler.
    pub early_margin: Duration,
    /// `KEEP_AFTER_READ`: consumer cushion in blocks.
    pub keep_after_read: usize,
    /// `PREFILL_BUFFERS`: warmup blocks rendered on prime.
    pub prefill_buffers: u32,
    /// `PRIME_TIMEOUT_MS`: how long the supervisor waits for prime-ready.
    pub prime_timeout: Duration,
    /// `OSC_HOST`: control transport bind address.
    pub osc_host: String,
    /// `OSC_PORT`: control transport port.
    pub osc_port: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: 512,
            sample_rate: 48000,
            num_buffers: 16,
            lead_target: 2,
            max_catchup: 2,
            early_margin: Duration::from_millis(2),
            keep_after_read: 2,
            prefill_buffers: 4,
            prime_timeout: Duration::from_millis(500),
            osc_host: "127.0.0.1".into(),
            osc_port: 5005,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            block_size: read_var("BUFFER_SIZE", defaults.block_size)?,
            sample_rate: read_var("SAMPLE_RATE", defaults.sample_rate)?,
            num_buffers: read_var("NUM_BUFFERS", defaults.num_buffers)?,
            lead_target: read_var("LEAD_TARGET", defaults.lead_target)?,
            max_catchup: read_var("MAX_CATCHUP", defaults.max_catchup)?,
            early_margin: Duration::from_millis(read_var("EARLY_MARGIN_MS", 2u64)?),
            keep_after_read: read_var("KEEP_AFTER_READ", defaults.keep_after_read)?,
            prefill_buffers: read_var("PREFILL_BUFFERS", defaults.prefill_buffers)?,
            prime_timeout: Duration::from_millis(read_var("PRIME_TIMEOUT_MS", 500u64)?),
            osc_host: std::env::var("OSC_HOST").unwrap_or(defaults.osc_host),
            osc_port: read_var("OSC_PORT", defaults.osc_port)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// The block period `B / sample_rate`.
    pub fn block_period(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / f64::from(self.sample_rate))
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(ConfigError::OutOfRange {
                name: "BUFFER_SIZE",
                value: self.block_size as i64,
                detail: "must be 1..=2048",
            });
        }
        if self.sample_rate < 8000 || self.sample_rate > 192_000 {
            return Err(ConfigError::OutOfRange {
                name: "SAMPLE_RATE",
                value: i64::from(self.sample_rate),
                detail: "must be 8000..=192000",
            });
        }
        if self.num_buffers < 4 {
            return Err(ConfigError::OutOfRange {
                name: "NUM_BUFFERS",
                value: self.num_buffers as i64,
                detail: "must be at least 4",
            });
        }
        // The cushion plus lead must fit inside the usable ring or the
        // consumer could never return a block.
        if self.keep_after_read + 1 >= self.num_buffers {
            return Err(ConfigError::OutOfRange {
                name: "KEEP_AFTER_READ",
                value: self.keep_after_read as i64,
                detail: "must be smaller than NUM_BUFFERS - 1",
            });
        }
        if self.max_catchup == 0 {
            return Err(ConfigError::OutOfRange {
                name: "MAX_CATCHUP",
                value: 0,
                detail: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// Reads and parses an env var, using `default` when unset or empty.
fn read_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) if !raw.is_empty() => raw.parse().map_err(|_| ConfigError::BadValue {
            name,
            value: raw,
        }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.block_size, 512);
        assert_eq!(config.num_buffers, 16);
        assert_eq!(config.prime_timeout, Duration::from_millis(500));
    }

    #[test]
    fn block_period_is_b_over_rate() {
        let config = EngineConfig::default();
        let period = config.block_period();
        assert!((period.as_secs_f64() - 512.0 / 48000.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_oversized_block() {
        let config = EngineConfig {
            block_size: MAX_BLOCK_SIZE + 1,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_cushion_wider_than_ring() {
        let config = EngineConfig {
            num_buffers: 4,
            keep_after_read: 3,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
