// src/config/validate.rs

use crate::config::model::{
    ConfigFile, EngineConfig, ElasticsearchConfig, RawConfigFile, TestConfig,
};
use crate::errors::{Result, RulewardenError};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::RulewardenError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let engine = validate_engine(&raw)?;
        validate_elasticsearch(&raw.elasticsearch)?;

        let test = TestConfig {
            scratch_dir: raw
                .test
                .scratch_dir
                .unwrap_or_else(TestConfig::default_scratch_dir),
        };

        Ok(ConfigFile::new_unchecked(engine, raw.elasticsearch, test))
    }
}

fn validate_engine(raw: &RawConfigFile) -> Result<EngineConfig> {
    let section = &raw.engine;

    if section.program.trim().is_empty() {
        return Err(RulewardenError::ConfigError(
            "[engine].program must not be empty".to_string(),
        ));
    }
    if section.install_path.as_os_str().is_empty() {
        return Err(RulewardenError::ConfigError(
            "[engine].install_path must not be empty".to_string(),
        ));
    }
    if section.config_file.trim().is_empty() {
        return Err(RulewardenError::ConfigError(
            "[engine].config_file must not be empty".to_string(),
        ));
    }

    let stop_timeout = parse_duration(&section.stop_timeout).map_err(|e| {
        RulewardenError::ConfigError(format!("[engine].stop_timeout: {e}"))
    })?;
    if stop_timeout.is_zero() {
        return Err(RulewardenError::ConfigError(
            "[engine].stop_timeout must be greater than zero".to_string(),
        ));
    }

    Ok(EngineConfig {
        program: section.program.clone(),
        install_path: section.install_path.clone(),
        config_file: section.config_file.clone(),
        stop_timeout,
    })
}

fn validate_elasticsearch(es: &ElasticsearchConfig) -> Result<()> {
    if es.host.trim().is_empty() {
        return Err(RulewardenError::ConfigError(
            "[elasticsearch].host must not be empty".to_string(),
        ));
    }
    if es.port == 0 {
        return Err(RulewardenError::ConfigError(
            "[elasticsearch].port must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}
