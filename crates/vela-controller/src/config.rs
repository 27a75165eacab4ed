//! Hierarchical configuration loader (§10): built-in defaults, then an
//! optional YAML file, then `VELA_`-prefixed environment variables, then
//! CLI flags — each layer overriding the last.

use clap::Parser;
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use vela_core::config::ProcessConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to extract configuration: {0}")]
    Extract(#[from] figment::Error),

    #[error("shard_id must not be empty")]
    EmptyShardId,

    #[error("concurrent_reconciles must be at least 1")]
    ZeroConcurrency,
}

/// `vela-controller` command-line flags. Every field doubles as an
/// environment variable override (`--shard-id` / `VELA_SHARD_ID`), taking
/// precedence over both the config file and the environment layer beneath
/// it.
#[derive(Debug, Parser)]
#[command(name = "vela-controller", about = "KubeVela application reconciliation engine")]
pub struct Cli {
    /// Path to a YAML config file, merged above the built-in defaults.
    #[arg(long, env = "VELA_CONFIG_FILE", default_value = "config/controller.yaml")]
    pub config_file: String,

    #[arg(long, env = "VELA_SHARD_ID")]
    pub shard_id: Option<String>,

    #[arg(long, env = "VELA_CONCURRENT_RECONCILES")]
    pub concurrent_reconciles: Option<usize>,

    #[arg(long, env = "VELA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Loads a `ProcessConfig` per the layering above. The YAML file is optional
/// — a missing file is silently treated as an empty layer, same as the
/// teacher's project-local config file lookup.
pub fn load(cli: &Cli) -> Result<ProcessConfig, ConfigError> {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(ProcessConfig::default()))
        .merge(Yaml::file(&cli.config_file))
        .merge(Env::prefixed("VELA_").split("__"));

    if let Some(shard_id) = &cli.shard_id {
        figment = figment.merge(("shard_id", shard_id));
    }
    if let Some(n) = cli.concurrent_reconciles {
        figment = figment.merge(("concurrent_reconciles", n));
    }

    let config: ProcessConfig = figment.extract()?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &ProcessConfig) -> Result<(), ConfigError> {
    if config.shard_id.trim().is_empty() {
        return Err(ConfigError::EmptyShardId);
    }
    if config.concurrent_reconciles == 0 {
        return Err(ConfigError::ZeroConcurrency);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn cli(config_file: &str) -> Cli {
        Cli {
            config_file: config_file.to_string(),
            shard_id: None,
            concurrent_reconciles: None,
            log_format: "pretty".to_string(),
        }
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = load(&cli("does/not/exist.yaml")).unwrap();
        assert_eq!(config.concurrent_reconciles, ProcessConfig::default().concurrent_reconciles);
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "concurrent_reconciles: 16\nshard_id: shard-3").unwrap();
        file.flush().unwrap();

        let config = load(&cli(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.concurrent_reconciles, 16);
        assert_eq!(config.shard_id, "shard-3");
    }

    #[test]
    fn cli_flag_overrides_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "concurrent_reconciles: 16").unwrap();
        file.flush().unwrap();

        let mut c = cli(file.path().to_str().unwrap());
        c.concurrent_reconciles = Some(32);
        let config = load(&c).unwrap();
        assert_eq!(config.concurrent_reconciles, 32);
    }

    #[test]
    fn empty_shard_id_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "shard_id: \"\"").unwrap();
        file.flush().unwrap();

        let err = load(&cli(file.path().to_str().unwrap())).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyShardId));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "concurrent_reconciles: 0").unwrap();
        file.flush().unwrap();

        let err = load(&cli(file.path().to_str().unwrap())).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroConcurrency));
    }
}
