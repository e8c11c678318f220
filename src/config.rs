//! Harness configuration with environment overrides

use crate::error::{Error, Result};
use std::str::FromStr;

pub const ENV_SEED: &str = "SPARSE_CONFORMANCE_SEED";
pub const ENV_SERIAL: &str = "SPARSE_CONFORMANCE_SERIAL";
pub const ENV_MAX_FAILURES: &str = "SPARSE_CONFORMANCE_MAX_FAILURES";
pub const ENV_TOLERANCE_SCALE: &str = "SPARSE_CONFORMANCE_TOLERANCE_SCALE";

#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    /// Base seed; every case derives its own seed from it and its index
    pub seed: u64,
    /// Run cases on the rayon pool
    pub parallel: bool,
    /// Stop starting new cases once this many have failed
    pub max_failures: Option<usize>,
    /// Multiplier applied to every default tolerance
    pub tolerance_scale: f64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed_cafe,
            parallel: true,
            max_failures: None,
            tolerance_scale: 1.0,
        }
    }
}

fn parse_env<T>(key: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse().map(Some).map_err(|e: T::Err| Error::Config {
            key,
            value,
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

/// `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off`, case-insensitive
fn parse_flag(key: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config {
            key,
            value: value.to_string(),
            reason: "expected 1/0, true/false, yes/no or on/off".to_string(),
        }),
    }
}

impl HarnessConfig {
    /// Defaults overridden by any `SPARSE_CONFORMANCE_*` variables that are set
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(seed) = parse_env::<u64>(ENV_SEED)? {
            config.seed = seed;
        }
        if let Ok(value) = std::env::var(ENV_SERIAL) {
            config.parallel = !parse_flag(ENV_SERIAL, &value)?;
        }
        config.max_failures = parse_env::<usize>(ENV_MAX_FAILURES)?;
        if let Some(scale) = parse_env::<f64>(ENV_TOLERANCE_SCALE)? {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(Error::Config {
                    key: ENV_TOLERANCE_SCALE,
                    value: scale.to_string(),
                    reason: "must be a positive finite number".to_string(),
                });
            }
            config.tolerance_scale = scale;
        }
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn serial(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn with_max_failures(mut self, limit: usize) -> Self {
        self.max_failures = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert!(config.parallel);
        assert_eq!(config.max_failures, None);
        assert_eq!(config.tolerance_scale, 1.0);
    }

    #[test]
    fn test_builders() {
        let config = HarnessConfig::default().with_seed(7).serial().with_max_failures(3);
        assert_eq!(config.seed, 7);
        assert!(!config.parallel);
        assert_eq!(config.max_failures, Some(3));
    }

    #[test]
    fn test_parse_flag() {
        for value in ["1", "true", "TRUE", " yes ", "on"] {
            dbg!(value);
            assert!(parse_flag(ENV_SERIAL, value).unwrap());
        }
        for value in ["0", "false", "No", "off"] {
            dbg!(value);
            assert!(!parse_flag(ENV_SERIAL, value).unwrap());
        }
        let err = parse_flag(ENV_SERIAL, "maybe").unwrap_err();
        assert!(matches!(err, Error::Config { key: ENV_SERIAL, .. }));
    }
}
