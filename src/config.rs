use crate::error::{Result, TsIndexError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Default tail window searched for the last PCR.
pub const DEFAULT_PCR_LOOKBACK_BYTES: u64 = 1_000_000;

/// Files tried by [`IndexConfig::discover`], in order.
pub const CONFIG_PATHS: [&str; 2] = ["./tsindex.toml", "./config.toml"];

/// Settings passed explicitly into every indexing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Bytes before end of file searched for the last PCR
    pub pcr_lookback_bytes: u64,
    /// Window length of the per-PID rate sampler, in seconds
    pub rate_window_secs: f64,
    /// Number of files scanned concurrently by the batch driver
    pub max_parallel_scans: usize,
    /// Whether audio PIDs get a PTS cadence analysis
    pub analyze_audio_pts: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            pcr_lookback_bytes: DEFAULT_PCR_LOOKBACK_BYTES,
            rate_window_secs: 1.0,
            max_parallel_scans: 4,
            analyze_audio_pts: true,
        }
    }
}

impl IndexConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: IndexConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        debug!("loaded config from {}", path.as_ref().display());
        Self::from_toml_str(&content)
    }

    /// Overrides fields from `TSINDEX_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_var("TSINDEX_PCR_LOOKBACK")? {
            self.pcr_lookback_bytes = v;
        }
        if let Some(v) = env_var("TSINDEX_RATE_WINDOW")? {
            self.rate_window_secs = v;
        }
        if let Some(v) = env_var("TSINDEX_MAX_PARALLEL")? {
            self.max_parallel_scans = v;
        }
        if let Some(v) = env_var("TSINDEX_AUDIO_PTS")? {
            self.analyze_audio_pts = v;
        }
        self.validate()
    }

    /// Loads the first config file found in the working directory, or the
    /// defaults, then applies environment overrides.
    pub fn discover() -> Result<Self> {
        let mut config = CONFIG_PATHS
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Self::load)
            .transpose()?
            .unwrap_or_default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pcr_lookback_bytes == 0 {
            return Err(TsIndexError::Config("pcr_lookback_bytes must be positive".into()));
        }
        if !(self.rate_window_secs.is_finite() && self.rate_window_secs > 0.0) {
            return Err(TsIndexError::Config(format!(
                "rate_window_secs must be positive, got {}",
                self.rate_window_secs
            )));
        }
        if self.max_parallel_scans == 0 {
            return Err(TsIndexError::Config("max_parallel_scans must be at least 1".into()));
        }
        Ok(())
    }
}

fn env_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| TsIndexError::Config(format!("invalid value for {}: {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# tsindex configuration

# Bytes before end of file searched for the last PCR
pcr_lookback_bytes = 1000000

# Per-PID max bitrate window, in seconds
rate_window_secs = 1.0

# Files indexed concurrently
max_parallel_scans = 4

# Analyse PTS cadence of audio streams
analyze_audio_pts = true
"#;
        fs::write(path, template)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = IndexConfig::from_toml_str("rate_window_secs = 0.5\n").unwrap();
        assert_eq!(
            config,
            IndexConfig {
                rate_window_secs: 0.5,
                ..IndexConfig::default()
            }
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            IndexConfig::from_toml_str("max_parallel_scans = 0"),
            Err(TsIndexError::Config(_))
        ));
        assert!(matches!(
            IndexConfig::from_toml_str("rate_window_secs = -1.0"),
            Err(TsIndexError::Config(_))
        ));
        assert!(matches!(
            IndexConfig::from_toml_str("pcr_lookback_bytes = \"lots\""),
            Err(TsIndexError::Toml(_))
        ));
    }

    #[test]
    fn test_template_round_trips() {
        let path = env::temp_dir().join(format!("tsindex-config-{}.toml", std::process::id()));
        let _ = fs::remove_file(&path);
        create_default_config_template(&path).unwrap();

        let config = IndexConfig::load(&path).unwrap();
        assert_eq!(config, IndexConfig::default());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_env_override() {
        env::set_var("TSINDEX_MAX_PARALLEL", "9");
        let mut config = IndexConfig::default();
        let applied = config.apply_env();
        env::remove_var("TSINDEX_MAX_PARALLEL");

        applied.unwrap();
        assert_eq!(config.max_parallel_scans, 9);
    }
}
