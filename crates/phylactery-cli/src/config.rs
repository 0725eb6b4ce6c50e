//! Configuration loading from `~/.phylactery/config.toml` with defaults.

use phylactery_types::config::{default_data_dir, PhylacteryConfig};
use std::path::{Path, PathBuf};
use tracing::info;

/// Load configuration from a TOML file, with defaults.
///
/// A missing, unreadable or malformed file yields the default configuration.
pub fn load_config(path: Option<&Path>) -> PhylacteryConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if config_path.exists() {
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<PhylacteryConfig>(&contents) {
                Ok(config) => {
                    info!(path = %config_path.display(), "Loaded configuration");
                    return config;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        path = %config_path.display(),
                        "Failed to parse config, using defaults"
                    );
                }
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to read config file, using defaults"
                );
            }
        }
    } else {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
    }

    PhylacteryConfig::default()
}

/// `~/.phylactery/config.toml`.
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_missing_file() {
        let config = load_config(Some(Path::new("/nonexistent/config.toml")));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.memory.working_capacity, 100);
    }

    #[test]
    fn test_load_config_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            log_level = "debug"
            data_dir = "/var/lib/phylactery"

            [drift]
            alert_threshold = 0.25
            "#
        )
        .unwrap();

        let config = load_config(Some(file.path()));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/phylactery"));
        assert_eq!(config.drift.alert_threshold, 0.25);
        assert_eq!(config.drift.history_limit, 1000);
        assert_eq!(config.consolidation.decay_factor, 0.95);
    }

    #[test]
    fn test_load_config_malformed_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is = = not toml").unwrap();
        let config = load_config(Some(file.path()));
        assert_eq!(config, PhylacteryConfig::default());
    }
}
