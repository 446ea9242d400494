/// HiFi Check configuration
use crate::error::{CheckError, Result};
use hifi_analysis::{FrequencyResponseAnalyzer, PlanConfig, Thresholds};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "hifi-check.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CheckConfig {
    pub plan: PlanConfig,
    pub thresholds: Thresholds,
}

impl CheckConfig {
    /// Load configuration from file and environment
    ///
    /// An explicit `path` must exist. Without one, `hifi-check.toml` is used
    /// if present. `HIFI_`-prefixed variables override both, with `__`
    /// between section and key (`HIFI_THRESHOLDS__PASSING_OFFSET_DB=-20`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, environment())
    }

    fn load_from(path: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                settings = settings.add_source(toml_file(path.to_path_buf()).required(true));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    settings = settings.add_source(toml_file(default_path));
                }
            }
        }

        let config = settings.add_source(env).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Build the analyzer this configuration describes
    pub fn analyzer(&self) -> Result<FrequencyResponseAnalyzer> {
        Ok(FrequencyResponseAnalyzer::from_config(
            &self.plan,
            self.thresholds.clone(),
        )?)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CheckError::Config(e.to_string()))
    }
}

fn toml_file(path: PathBuf) -> config::File<config::FileSourceFile, config::FileFormat> {
    config::File::from(path).format(config::FileFormat::Toml)
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("HIFI")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = CheckConfig::load_from(None, env(&[])).unwrap();
        assert_eq!(config, CheckConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config(
            r#"
[plan]
repetitions = 3
min_frequency_hz = 1000

[thresholds]
passing_offset_db = -12.5
"#,
        );
        let config = CheckConfig::load_from(Some(file.path()), env(&[])).unwrap();

        assert_eq!(config.plan.repetitions, 3);
        assert_eq!(config.plan.min_frequency_hz, 1000.0);
        assert_eq!(config.plan.sample_rate, 48000);
        assert_eq!(config.thresholds.passing_offset_db, -12.5);
        assert_eq!(config.thresholds.max_mean_cv, 1.0);
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config("[thresholds]\npassing_offset_db = -12.0\n");
        let vars = [
            ("HIFI_THRESHOLDS__PASSING_OFFSET_DB", "-20"),
            ("HIFI_PLAN__ORDER_SEED", "42"),
        ];
        let config = CheckConfig::load_from(Some(file.path()), env(&vars)).unwrap();

        assert_eq!(config.thresholds.passing_offset_db, -20.0);
        assert_eq!(config.plan.order_seed, 42);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = CheckConfig::load_from(Some(&missing), env(&[])).unwrap_err();
        assert!(matches!(err, CheckError::Config(_)));
    }

    #[test]
    fn test_toml_output_loads_back() {
        let mut original = CheckConfig::default();
        original.plan.repetitions = 7;
        original.thresholds.band_low_hz = 17000.0;

        let file = write_config(&original.to_toml().unwrap());
        let loaded = CheckConfig::load_from(Some(file.path()), env(&[])).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_invalid_plan_rejected_by_analyzer() {
        let mut config = CheckConfig::default();
        config.plan.frequency_step_hz = 0.0;
        assert!(matches!(config.analyzer(), Err(CheckError::Analysis(_))));
    }
}
