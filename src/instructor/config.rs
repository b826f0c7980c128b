//! Layered YAML/TOML/JSON configuration for instructor mode, loaded with the
//! `config` crate and validated before anything connects to a worker.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// One worker target the instructor should dial.
#[derive(Debug, Clone, Deserialize)]
pub struct InstructorWorkerConfig {
    pub alias: String,
    /// Historical misspelling, kept verbatim for config-file compatibility.
    pub adress: String,
    pub port: u16,
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

/// A URL and its relative selection weight, as configured by the operator.
#[derive(Debug, Clone, Deserialize)]
pub struct InstructorEndpoint {
    pub url: String,
    pub weight: u32,
}

/// Top-level `instructor:` section of the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct InstructorConfig {
    pub workers: Vec<InstructorWorkerConfig>,
    pub endpoints: Vec<InstructorEndpoint>,
    /// Virtual users to simulate per worker.
    pub amount: u32,
    pub minwait: u64,
    pub maxwait: u64,
    #[serde(default = "default_result_file")]
    pub resultfile: String,
}

fn default_result_file() -> String {
    "results.json".to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing instructor config")]
    Missing,
    #[error("no worker targets configured")]
    NoWorkers,
    #[error("invalid alias '{0}'")]
    InvalidAlias(String),
    #[error("invalid adress '{0}'")]
    InvalidAdress(String),
    #[error("invalid port '{0}'")]
    InvalidPort(u16),
    #[error("could not load config: {0}")]
    Load(#[from] config::ConfigError),
}

impl InstructorConfig {
    /// Loads the `instructor` table out of `path`, letting the `config`
    /// crate pick the format (YAML/TOML/JSON) from the file extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;

        let cfg: Self = source.get("instructor")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Mirrors the original's `ValidateInstructorConfig`: every worker needs
    /// a non-empty alias, address and port before we attempt to dial it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.is_empty() {
            return Err(ConfigError::NoWorkers);
        }

        for w in &self.workers {
            if w.alias.is_empty() {
                return Err(ConfigError::InvalidAlias(w.alias.clone()));
            }
            if w.adress.is_empty() {
                return Err(ConfigError::InvalidAdress(w.adress.clone()));
            }
            if w.port == 0 {
                return Err(ConfigError::InvalidPort(w.port));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> InstructorConfig {
        InstructorConfig {
            workers: vec![InstructorWorkerConfig {
                alias: "worker-a".into(),
                adress: "127.0.0.1".into(),
                port: 50051,
                certificate: None,
                secret: None,
            }],
            endpoints: vec![InstructorEndpoint { url: "http://a".into(), weight: 1 }],
            amount: 10,
            minwait: 100,
            maxwait: 200,
            resultfile: default_result_file(),
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn empty_worker_list_is_rejected() {
        let mut cfg = valid();
        cfg.workers.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::NoWorkers)));
    }

    #[test]
    fn empty_alias_is_rejected() {
        let mut cfg = valid();
        cfg.workers[0].alias.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidAlias(_))));
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut cfg = valid();
        cfg.workers[0].port = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidPort(_))));
    }
}
