// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, RulewardenError};

/// Prefix for environment variables that override `[elasticsearch]` values.
pub const ENV_PREFIX: &str = "RULEWARDEN_ES_";

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** apply environment
/// overrides or validate. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Apply `RULEWARDEN_ES_*` overrides on top of the file values.
///
/// `lookup` is usually `|k| std::env::var(k).ok()`; tests pass a map.
pub fn apply_env_overrides<F>(raw: &mut RawConfigFile, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |suffix: &str| {
        let key = format!("{ENV_PREFIX}{suffix}");
        lookup(&key).map(|value| (key, value))
    };
    let es = &mut raw.elasticsearch;

    if let Some((key, host)) = var("HOST") {
        debug!(%key, "overriding elasticsearch host from environment");
        es.host = host;
    }
    if let Some((key, port)) = var("PORT") {
        es.port = port.trim().parse().map_err(|e| {
            RulewardenError::ConfigError(format!("{key}={port:?} is not a valid port: {e}"))
        })?;
    }
    if let Some((key, ssl)) = var("USE_SSL") {
        es.use_ssl = parse_bool(&ssl).ok_or_else(|| {
            RulewardenError::ConfigError(format!("{key}={ssl:?} is not a boolean"))
        })?;
    }
    if let Some((_, user)) = var("USERNAME") {
        es.username = Some(user);
    }
    if let Some((_, pass)) = var("PASSWORD") {
        es.password = Some(pass);
    }

    Ok(())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Load a configuration file from path, apply environment overrides and
/// validate.
///
/// This is the recommended entry point for the rest of the application.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let mut raw_config = load_from_path(&path)?;
    apply_env_overrides(&mut raw_config, |k| std::env::var(k).ok())?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}
