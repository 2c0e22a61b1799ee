//! Configuration loading helpers
//!
//! Layered configuration with `figment`: compiled defaults, then a YAML file,
//! then prefixed environment variables (`PREFIX_SECTION__FIELD`).

use std::path::Path;

use errors::{GatewayError, GatewayResult};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

/// Build the layered figment for a config type without extracting it
pub fn figment_for<T>(path: &Path, env_prefix: &str) -> Figment
where
    T: Serialize + Default,
{
    Figment::from(Serialized::defaults(T::default()))
        .merge(Yaml::file(path))
        .merge(Env::prefixed(env_prefix).split("__"))
}

/// Load configuration: defaults < YAML file < environment
pub fn load_config<T>(path: &Path, env_prefix: &str) -> GatewayResult<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    if path.exists() {
        info!("Loading configuration from {}", path.display());
    } else {
        warn!(
            "Configuration file {} not found, using defaults and environment",
            path.display()
        );
    }

    figment_for::<T>(path, env_prefix)
        .extract()
        .map_err(|e| GatewayError::Configuration(format!("Failed to load configuration: {}", e)))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        interval_ms: u64,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                name: "default".into(),
                interval_ms: 2000,
            }
        }
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg: Sample = load_config(&dir.path().join("absent.yaml"), "SAMPLE_NONE_").unwrap();
        assert_eq!(cfg, Sample::default());
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "interval_ms: 500").unwrap();

        let cfg: Sample = load_config(&path, "SAMPLE_YAML_").unwrap();
        assert_eq!(cfg.interval_ms, 500);
        assert_eq!(cfg.name, "default");
    }

    #[test]
    fn test_invalid_yaml_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "interval_ms: [not, a, number]").unwrap();

        let err = load_config::<Sample>(&path, "SAMPLE_BROKEN_").unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }
}
