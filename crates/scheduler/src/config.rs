//! Scheduler configuration
//!
//! Central configuration for the latency band, both pass executors, the display
//! clock and progressive escalation. Configuration can be loaded from a TOML
//! file, environment variables, or created programmatically. Every pass
//! constructor validates its section before any work starts.

use crate::budget::LatencyBand;
use crate::error::ConfigError;
use crate::queue::UnitGranularity;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

/// Top-level scheduler configuration
///
/// Expected file format (every key optional):
/// ```toml
/// [band]
/// min_ms = 80.0
/// max_ms = 120.0
/// mid_ms = 100.0
///
/// [cooperative]
/// initial_chunk_size = 10
/// granularity = "pixel"
///
/// [pool]
/// workers = 7
/// poll_interval_ms = 100
/// granularity = "column"
///
/// [display]
/// period_ms = 33
///
/// [progressive]
/// max_passes = 5
/// preview_divisor = 4
/// preview_samples_per_unit = 1
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub band: LatencyBand,
    pub cooperative: CooperativeConfig,
    pub pool: PoolConfig,
    pub display: DisplayConfig,
    pub progressive: ProgressiveConfig,
}

/// Single-threaded executor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooperativeConfig {
    /// Chunk size for the first tick, before any measurement exists
    pub initial_chunk_size: usize,
    pub granularity: UnitGranularity,
}

impl Default for CooperativeConfig {
    fn default() -> Self {
        Self {
            initial_chunk_size: 10,
            granularity: UnitGranularity::Pixel,
        }
    }
}

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Worker count; unset means one less than the available parallelism
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Upper bound on how long the controller waits between liveness checks
    pub poll_interval_ms: u64,
    pub granularity: UnitGranularity,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: None,
            poll_interval_ms: 100,
            granularity: UnitGranularity::Column,
        }
    }
}

impl PoolConfig {
    /// Worker count after applying the default
    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(default_pool_size)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Display commit settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub period_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { period_ms: 33 }
    }
}

impl DisplayConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Progressive escalation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressiveConfig {
    /// Full-fidelity passes to accumulate
    pub max_passes: u32,
    /// Preview resolution is the full resolution divided by this on each axis
    pub preview_divisor: u32,
    pub preview_samples_per_unit: u32,
}

impl Default for ProgressiveConfig {
    fn default() -> Self {
        Self {
            max_passes: 5,
            preview_divisor: 4,
            preview_samples_per_unit: 1,
        }
    }
}

/// One less than the available parallelism, leaving a core for the host
pub fn default_pool_size() -> usize {
    let available = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    available.saturating_sub(1).max(1)
}

impl SchedulerConfig {
    /// Check every section, rejecting values that cannot start a pass
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.band.validate()?;
        if self.cooperative.initial_chunk_size == 0 {
            return Err(ConfigError::ZeroInitialChunk);
        }
        if self.pool.workers == Some(0) {
            return Err(ConfigError::ZeroPoolSize);
        }
        if self.pool.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.display.period_ms == 0 {
            return Err(ConfigError::ZeroDisplayPeriod);
        }
        if self.progressive.max_passes == 0 {
            return Err(ConfigError::ZeroMaxPasses);
        }
        if self.progressive.preview_divisor == 0 {
            return Err(ConfigError::ZeroPreviewDivisor);
        }
        Ok(())
    }

    /// Load configuration from environment variables over the defaults
    ///
    /// Environment variables:
    /// - `RAYPACE_BAND_MIN_MS`, `RAYPACE_BAND_MAX_MS`, `RAYPACE_BAND_MID_MS`
    /// - `RAYPACE_INITIAL_CHUNK`
    /// - `RAYPACE_WORKERS`
    /// - `RAYPACE_POLL_INTERVAL_MS`
    /// - `RAYPACE_DISPLAY_PERIOD_MS`
    /// - `RAYPACE_MAX_PASSES`
    ///
    /// Setting only min and max moves the midpoint with them.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let min = env_value::<f64>("RAYPACE_BAND_MIN_MS")?;
        let max = env_value::<f64>("RAYPACE_BAND_MAX_MS")?;
        if min.is_some() || max.is_some() {
            config.band = LatencyBand::new(
                min.unwrap_or(config.band.min_ms),
                max.unwrap_or(config.band.max_ms),
            );
        }
        if let Some(mid) = env_value::<f64>("RAYPACE_BAND_MID_MS")? {
            config.band.mid_ms = mid;
        }

        if let Some(chunk) = env_value("RAYPACE_INITIAL_CHUNK")? {
            config.cooperative.initial_chunk_size = chunk;
        }
        if let Some(workers) = env_value("RAYPACE_WORKERS")? {
            config.pool.workers = Some(workers);
        }
        if let Some(interval) = env_value("RAYPACE_POLL_INTERVAL_MS")? {
            config.pool.poll_interval_ms = interval;
        }
        if let Some(period) = env_value("RAYPACE_DISPLAY_PERIOD_MS")? {
            config.display.period_ms = period;
        }
        if let Some(passes) = env_value("RAYPACE_MAX_PASSES")? {
            config.progressive.max_passes = passes;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from a TOML string; missing keys keep defaults
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }
}

fn env_value<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ENV_KEYS: &[&str] = &[
        "RAYPACE_BAND_MIN_MS",
        "RAYPACE_BAND_MAX_MS",
        "RAYPACE_BAND_MID_MS",
        "RAYPACE_INITIAL_CHUNK",
        "RAYPACE_WORKERS",
        "RAYPACE_POLL_INTERVAL_MS",
        "RAYPACE_DISPLAY_PERIOD_MS",
        "RAYPACE_MAX_PASSES",
    ];

    // Save and restore env vars to avoid test pollution
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in var_names {
                env::remove_var(name);
            }
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.band, LatencyBand::new(80.0, 120.0));
        assert_eq!(config.cooperative.initial_chunk_size, 10);
        assert_eq!(config.cooperative.granularity, UnitGranularity::Pixel);
        assert_eq!(config.pool.workers, None);
        assert_eq!(config.pool.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.pool.granularity, UnitGranularity::Column);
        assert_eq!(config.display.period(), Duration::from_millis(33));
        assert_eq!(config.progressive.max_passes, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_pool_size_reserves_host_core() {
        let size = default_pool_size();
        assert!(size >= 1);
        let available = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        assert!(size <= available.max(1));
    }

    #[test]
    fn test_resolved_workers() {
        let mut pool = PoolConfig::default();
        assert_eq!(pool.resolved_workers(), default_pool_size());
        pool.workers = Some(3);
        assert_eq!(pool.resolved_workers(), 3);
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let mut config = SchedulerConfig::default();
        config.cooperative.initial_chunk_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroInitialChunk)));

        let mut config = SchedulerConfig::default();
        config.pool.workers = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroPoolSize)));

        let config = SchedulerConfig::from_toml("[pool]\nworkers = 1\npoll_interval_ms = 0").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ZeroPollInterval)));

        let mut config = SchedulerConfig::default();
        config.display.period_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroDisplayPeriod)));

        let mut config = SchedulerConfig::default();
        config.progressive.max_passes = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroMaxPasses)));

        let mut config = SchedulerConfig::default();
        config.progressive.preview_divisor = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroPreviewDivisor)));
    }

    #[test]
    fn test_validate_rejects_inverted_band() {
        let mut config = SchedulerConfig::default();
        config.band = LatencyBand::new(120.0, 80.0);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBand { .. })));
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
            [band]
            min_ms = 40
            max_ms = 60.0
            mid_ms = 45.0

            [cooperative]
            initial_chunk_size = 25
            granularity = "column"

            [pool]
            workers = 3
            poll_interval_ms = 20

            [progressive]
            max_passes = 2
        "#;

        let config = SchedulerConfig::from_toml(toml).unwrap();
        assert_eq!(config.band, LatencyBand::new(40.0, 60.0).with_mid(45.0));
        assert_eq!(config.cooperative.initial_chunk_size, 25);
        assert_eq!(config.cooperative.granularity, UnitGranularity::Column);
        assert_eq!(config.pool.workers, Some(3));
        assert_eq!(config.pool.poll_interval_ms, 20);
        assert_eq!(config.pool.granularity, UnitGranularity::Column); // default
        assert_eq!(config.display.period_ms, 33); // default
        assert_eq!(config.progressive.max_passes, 2);
        assert_eq!(config.progressive.preview_divisor, 4); // default
    }

    #[test]
    fn test_from_toml_empty() {
        let config = SchedulerConfig::from_toml("").unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn test_from_toml_invalid() {
        let result = SchedulerConfig::from_toml("[pool]\nworkers = \"many\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = SchedulerConfig::default();
        config.pool.workers = Some(6);
        config.band = LatencyBand::new(10.0, 30.0);

        let toml = config.to_toml().unwrap();
        let parsed = SchedulerConfig::from_toml(&toml).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_file_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raypace.toml");

        let mut config = SchedulerConfig::default();
        config.display.period_ms = 16;
        config.save_to_file(&path).unwrap();

        let loaded = SchedulerConfig::from_file(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = SchedulerConfig::from_file(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(ENV_KEYS);

        env::set_var("RAYPACE_BAND_MIN_MS", "20");
        env::set_var("RAYPACE_BAND_MAX_MS", "40");
        env::set_var("RAYPACE_INITIAL_CHUNK", "64");
        env::set_var("RAYPACE_WORKERS", "2");
        env::set_var("RAYPACE_POLL_INTERVAL_MS", "10");
        env::set_var("RAYPACE_DISPLAY_PERIOD_MS", "16");
        env::set_var("RAYPACE_MAX_PASSES", "8");

        let config = SchedulerConfig::from_env().unwrap();
        assert_eq!(config.band, LatencyBand::new(20.0, 40.0));
        assert_eq!(config.band.mid_ms, 30.0);
        assert_eq!(config.cooperative.initial_chunk_size, 64);
        assert_eq!(config.pool.workers, Some(2));
        assert_eq!(config.pool.poll_interval_ms, 10);
        assert_eq!(config.display.period_ms, 16);
        assert_eq!(config.progressive.max_passes, 8);
    }

    #[test]
    #[serial]
    fn test_from_env_partial() {
        let _guard = EnvGuard::new(ENV_KEYS);

        env::set_var("RAYPACE_BAND_MID_MS", "90");

        let config = SchedulerConfig::from_env().unwrap();
        assert_eq!(config.band.min_ms, 80.0); // default
        assert_eq!(config.band.max_ms, 120.0); // default
        assert_eq!(config.band.mid_ms, 90.0);
        assert_eq!(config.pool.workers, None);
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(ENV_KEYS);

        env::set_var("RAYPACE_WORKERS", "not_a_number");
        let result = SchedulerConfig::from_env();
        assert!(matches!(result, Err(ConfigError::InvalidValue(key)) if key == "RAYPACE_WORKERS"));
    }
}
