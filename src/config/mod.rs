//! Configuration management for authstack

use crate::construct::Environment;
use crate::error::{AppError, Result};
use crate::stack::{DEFAULT_ASSET_DIR, DEFAULT_STACK_NAME};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Optional settings file read by [`Config::load`]
pub const CONFIG_FILE: &str = "authstack.toml";

const DEFAULT_OUTDIR: &str = "cdk.out";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Name of the stack inside the app
    pub stack_name: String,
    /// Where synthesized templates are written
    pub outdir: PathBuf,
    /// Directory bundled as the function's code
    pub asset_dir: PathBuf,
    /// Target account (`CDK_DEFAULT_ACCOUNT`)
    pub account: Option<String>,
    /// Target region (`CDK_DEFAULT_REGION`)
    pub region: Option<String>,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// "text" or "json"
    pub log_format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Keys accepted in `authstack.toml` and as `AUTHSTACK_*` variables
#[derive(Debug, Deserialize)]
struct Settings {
    stack_name: String,
    outdir: PathBuf,
    asset_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Self::build(
            var("AUTHSTACK_STACK_NAME").unwrap_or_else(|| DEFAULT_STACK_NAME.to_string()),
            var("AUTHSTACK_OUTDIR")
                .unwrap_or_else(|| DEFAULT_OUTDIR.to_string())
                .into(),
            var("AUTHSTACK_ASSET_DIR")
                .unwrap_or_else(|| DEFAULT_ASSET_DIR.to_string())
                .into(),
        )
    }

    /// Layer `authstack.toml` (if present) under the environment
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(file: &Path) -> Result<Self> {
        let settings: Settings = config::Config::builder()
            .set_default("stack_name", DEFAULT_STACK_NAME)?
            .set_default("outdir", DEFAULT_OUTDIR)?
            .set_default("asset_dir", DEFAULT_ASSET_DIR)?
            .add_source(config::File::from(file).required(false))
            .add_source(config::Environment::with_prefix("AUTHSTACK"))
            .build()?
            .try_deserialize()?;
        Self::build(settings.stack_name, settings.outdir, settings.asset_dir)
    }

    fn build(stack_name: String, outdir: PathBuf, asset_dir: PathBuf) -> Result<Self> {
        let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
        if log_format != "text" && log_format != "json" {
            return Err(AppError::invalid(
                "LOG_FORMAT",
                format!("'{}' must be 'text' or 'json'", log_format),
            ));
        }
        Ok(Self {
            stack_name,
            outdir,
            asset_dir,
            account: non_empty_var("CDK_DEFAULT_ACCOUNT"),
            region: non_empty_var("CDK_DEFAULT_REGION"),
            telemetry: TelemetryConfig { log_format },
        })
    }

    /// Deployment target passed explicitly into the stack
    pub fn environment(&self) -> Environment {
        Environment {
            account: self.account.clone(),
            region: self.region.clone(),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn test_config() -> Config {
        Config {
            stack_name: DEFAULT_STACK_NAME.to_string(),
            outdir: PathBuf::from("cdk.out"),
            asset_dir: PathBuf::from("lambda"),
            account: None,
            region: Some("ap-northeast-1".to_string()),
            telemetry: TelemetryConfig::default(),
        }
    }

    #[test]
    fn test_environment_from_config() {
        let env = test_config().environment();
        assert_eq!(env.account, None);
        assert_eq!(env.region.as_deref(), Some("ap-northeast-1"));
        assert!(!env.is_agnostic());
    }

    #[test]
    fn test_telemetry_defaults_to_text() {
        assert_eq!(TelemetryConfig::default().log_format, "text");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.asset_dir, PathBuf::from(DEFAULT_ASSET_DIR));
    }

    #[test]
    fn test_file_values_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("authstack.toml");
        fs::write(&file, "asset_dir = \"functions\"\noutdir = \"build\"\n").unwrap();
        let config = Config::load_from(&file).unwrap();
        assert_eq!(config.asset_dir, PathBuf::from("functions"));
        assert_eq!(config.outdir, PathBuf::from("build"));
    }

    #[test]
    fn test_vars_override_defaults() {
        let config = Config::from_vars(|key| match key {
            "AUTHSTACK_STACK_NAME" => Some("OtherStack".to_string()),
            "AUTHSTACK_ASSET_DIR" => Some("functions".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.stack_name, "OtherStack");
        assert_eq!(config.asset_dir, PathBuf::from("functions"));
        assert_eq!(config.outdir, PathBuf::from(DEFAULT_OUTDIR));
    }

    #[test]
    fn test_unset_vars_use_defaults() {
        let config = Config::from_vars(|_| None).unwrap();
        assert_eq!(config.stack_name, DEFAULT_STACK_NAME);
        assert_eq!(config.outdir, PathBuf::from(DEFAULT_OUTDIR));
        assert_eq!(config.asset_dir, PathBuf::from(DEFAULT_ASSET_DIR));
    }

    #[test]
    fn test_from_env_agrees_with_load_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(Config::from_env().unwrap(), loaded);
    }

    #[test]
    fn test_config_debug() {
        let debug_str = format!("{:?}", test_config());
        assert!(debug_str.contains("Config"));
        assert!(debug_str.contains("stack_name"));
    }
}
