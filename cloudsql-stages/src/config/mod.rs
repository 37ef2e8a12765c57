//! Harness configuration.
//!
//! Defaults match the layout of the Terraform repository the harness runs
//! against: example modules under `../examples`, binaries on `PATH`, and a
//! single approved region. Every field can be overridden from a JSON file or
//! from `CLOUDSQL_STAGES_*` environment variables.

mod env;

pub use env::{EnvSource, MapEnv, ProcessEnv};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{HarnessError, Result};

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "CLOUDSQL_STAGES_";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Configuration for a harness run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Root folder containing the examples folder.
    #[serde(default = "default_module_root")]
    pub module_root: PathBuf,
    /// Name of the folder holding the example modules.
    #[serde(default = "default_examples_folder")]
    pub examples_folder: String,
    /// Terraform binary.
    #[serde(default = "default_terraform_bin")]
    pub terraform_bin: String,
    /// Cloud SQL proxy binary.
    #[serde(default = "default_proxy_bin")]
    pub proxy_bin: String,
    /// gcloud binary, used to list zones.
    #[serde(default = "default_gcloud_bin")]
    pub gcloud_bin: String,
    /// Regions the bootstrap stage may pick from.
    #[serde(default = "default_approved_regions")]
    pub approved_regions: Vec<String>,
    /// Regions that must never be picked.
    #[serde(default)]
    pub forbidden_regions: Vec<String>,
    /// Dial/read/write timeout for connections made through the proxy.
    #[serde(default = "default_proxy_timeout")]
    pub proxy_timeout_seconds: f64,
    /// Optional connect timeout for direct connections; driver default when unset.
    #[serde(default)]
    pub sql_timeout_seconds: Option<f64>,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_module_root() -> PathBuf {
    PathBuf::from("..")
}

fn default_examples_folder() -> String {
    "examples".to_string()
}

fn default_terraform_bin() -> String {
    "terraform".to_string()
}

fn default_proxy_bin() -> String {
    "cloud-sql-proxy".to_string()
}

fn default_gcloud_bin() -> String {
    "gcloud".to_string()
}

fn default_approved_regions() -> Vec<String> {
    vec!["europe-north1".to_string()]
}

fn default_proxy_timeout() -> f64 {
    10.0
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            module_root: default_module_root(),
            examples_folder: default_examples_folder(),
            terraform_bin: default_terraform_bin(),
            proxy_bin: default_proxy_bin(),
            gcloud_bin: default_gcloud_bin(),
            approved_regions: default_approved_regions(),
            forbidden_regions: Vec::new(),
            proxy_timeout_seconds: default_proxy_timeout(),
            sql_timeout_seconds: None,
            log_format: LogFormat::default(),
        }
    }
}

impl HarnessConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file; missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from defaults overlaid with `CLOUDSQL_STAGES_*` variables.
    ///
    /// If `CLOUDSQL_STAGES_CONFIG` names a JSON file it is loaded first.
    pub fn from_env(env: &dyn EnvSource) -> Result<Self> {
        let base = match env.var(&format!("{ENV_PREFIX}CONFIG")) {
            Some(path) if !path.is_empty() => Self::from_json_file(path)?,
            _ => Self::default(),
        };
        base.overlay_env(env)
    }

    /// Applies `CLOUDSQL_STAGES_*` overrides on top of this configuration.
    pub fn overlay_env(mut self, env: &dyn EnvSource) -> Result<Self> {
        let get = |name: &str| env.var(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());

        if let Some(v) = get("MODULE_ROOT") {
            self.module_root = PathBuf::from(v);
        }
        if let Some(v) = get("EXAMPLES_FOLDER") {
            self.examples_folder = v;
        }
        if let Some(v) = get("TERRAFORM_BIN") {
            self.terraform_bin = v;
        }
        if let Some(v) = get("PROXY_BIN") {
            self.proxy_bin = v;
        }
        if let Some(v) = get("GCLOUD_BIN") {
            self.gcloud_bin = v;
        }
        if let Some(v) = get("APPROVED_REGIONS") {
            self.approved_regions = split_list(&v);
        }
        if let Some(v) = get("FORBIDDEN_REGIONS") {
            self.forbidden_regions = split_list(&v);
        }
        if let Some(v) = get("PROXY_TIMEOUT_SECONDS") {
            self.proxy_timeout_seconds = parse_seconds("PROXY_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = get("SQL_TIMEOUT_SECONDS") {
            self.sql_timeout_seconds = Some(parse_seconds("SQL_TIMEOUT_SECONDS", &v)?);
        }
        if let Some(v) = get("LOG_FORMAT") {
            self.log_format = match v.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(HarnessError::Config(format!(
                        "{ENV_PREFIX}LOG_FORMAT must be 'pretty' or 'json', got '{other}'"
                    )))
                }
            };
        }

        self.validate()?;
        Ok(self)
    }

    /// Checks invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.approved_regions.is_empty() {
            return Err(HarnessError::Config(
                "approved_regions must not be empty".to_string(),
            ));
        }
        if self.proxy_timeout_seconds <= 0.0 {
            return Err(HarnessError::Config(
                "proxy_timeout_seconds must be positive".to_string(),
            ));
        }
        if matches!(self.sql_timeout_seconds, Some(s) if s <= 0.0) {
            return Err(HarnessError::Config(
                "sql_timeout_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the module root.
    #[must_use]
    pub fn with_module_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.module_root = root.into();
        self
    }

    /// Sets the examples folder name.
    #[must_use]
    pub fn with_examples_folder(mut self, folder: impl Into<String>) -> Self {
        self.examples_folder = folder.into();
        self
    }

    /// Sets the Terraform binary.
    #[must_use]
    pub fn with_terraform_bin(mut self, bin: impl Into<String>) -> Self {
        self.terraform_bin = bin.into();
        self
    }

    /// Sets the approved regions.
    #[must_use]
    pub fn with_approved_regions(mut self, regions: Vec<String>) -> Self {
        self.approved_regions = regions;
        self
    }

    /// Path of the examples folder in the source tree.
    #[must_use]
    pub fn examples_dir(&self) -> PathBuf {
        self.module_root.join(&self.examples_folder)
    }

    /// Gets the proxy timeout as Duration.
    #[must_use]
    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.proxy_timeout_seconds)
    }

    /// Gets the direct connection timeout as Duration.
    #[must_use]
    pub fn sql_timeout(&self) -> Option<Duration> {
        self.sql_timeout_seconds.map(Duration::from_secs_f64)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_seconds(name: &str, raw: &str) -> Result<f64> {
    raw.parse::<f64>().map_err(|e| {
        HarnessError::Config(format!("{ENV_PREFIX}{name} must be a number of seconds: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.examples_dir(), PathBuf::from("../examples"));
        assert_eq!(config.approved_regions, vec!["europe-north1".to_string()]);
        assert_eq!(config.proxy_timeout(), Duration::from_secs(10));
        assert_eq!(config.sql_timeout(), None);
    }

    #[test]
    fn test_env_overlay() {
        let env = MapEnv::new()
            .with("CLOUDSQL_STAGES_TERRAFORM_BIN", "/opt/terraform")
            .with("CLOUDSQL_STAGES_APPROVED_REGIONS", "europe-west1, us-east1")
            .with("CLOUDSQL_STAGES_SQL_TIMEOUT_SECONDS", "2.5")
            .with("CLOUDSQL_STAGES_LOG_FORMAT", "JSON");

        let config = HarnessConfig::from_env(&env).unwrap();
        assert_eq!(config.terraform_bin, "/opt/terraform");
        assert_eq!(
            config.approved_regions,
            vec!["europe-west1".to_string(), "us-east1".to_string()]
        );
        assert_eq!(config.sql_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_env_overlay_rejects_bad_numbers() {
        let env = MapEnv::new().with("CLOUDSQL_STAGES_PROXY_TIMEOUT_SECONDS", "soon");
        let err = HarnessConfig::from_env(&env).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_empty_regions() {
        let config = HarnessConfig::new().with_approved_regions(Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file_uses_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"module_root": "/src/terraform-google-sql", "proxy_bin": "proxy"}}"#
        )
        .unwrap();

        let config = HarnessConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.module_root, PathBuf::from("/src/terraform-google-sql"));
        assert_eq!(config.proxy_bin, "proxy");
        assert_eq!(config.terraform_bin, "terraform");
    }

    #[test]
    fn test_from_env_loads_config_file_first() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"gcloud_bin": "/usr/lib/gcloud", "terraform_bin": "tf"}}"#).unwrap();

        let env = MapEnv::new()
            .with("CLOUDSQL_STAGES_CONFIG", file.path().to_string_lossy().to_string())
            .with("CLOUDSQL_STAGES_TERRAFORM_BIN", "tofu");

        let config = HarnessConfig::from_env(&env).unwrap();
        assert_eq!(config.gcloud_bin, "/usr/lib/gcloud");
        assert_eq!(config.terraform_bin, "tofu");
    }
}
