// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration exactly as read from the TOML file.
///
/// ```toml
/// [engine]
/// program = "elastalert"
/// install_path = "/opt/elastalert"
/// config_file = "config.yaml"
/// stop_timeout = "10s"
///
/// [elasticsearch]
/// host = "localhost"
/// port = 9200
/// use_ssl = false
///
/// [test]
/// scratch_dir = "/tmp/rulewarden-tests"
/// ```
///
/// Only `[engine]` is mandatory. Turn it into a [`ConfigFile`] with
/// `ConfigFile::try_from`, which validates it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub engine: EngineSection,

    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,

    #[serde(default)]
    pub test: TestSection,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Engine command-line executable.
    pub program: String,

    /// Installation directory; working directory of every engine invocation.
    pub install_path: PathBuf,

    /// Engine config file, relative to `install_path`.
    #[serde(default = "default_config_file")]
    pub config_file: String,

    /// Grace period between the interrupt sent by `stop()` and a forced kill.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: String,
}

fn default_config_file() -> String {
    "config.yaml".to_string()
}

fn default_stop_timeout() -> String {
    "10s".to_string()
}

/// `[elasticsearch]` section.
///
/// These are handed to test runs as `ES_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ElasticsearchConfig {
    #[serde(default = "default_es_host")]
    pub host: String,

    #[serde(default = "default_es_port")]
    pub port: u16,

    #[serde(default)]
    pub use_ssl: bool,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

fn default_es_host() -> String {
    "localhost".to_string()
}

fn default_es_port() -> u16 {
    9200
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            host: default_es_host(),
            port: default_es_port(),
            use_ssl: false,
            username: None,
            password: None,
        }
    }
}

impl ElasticsearchConfig {
    /// Environment entries that override whatever the parent process has.
    ///
    /// Credentials are only included when configured, so an inherited
    /// `ES_USERNAME` / `ES_PASSWORD` survives when none is set here.
    pub fn env_overrides(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("ES_HOST".to_string(), self.host.clone()),
            ("ES_PORT".to_string(), self.port.to_string()),
            ("ES_USE_SSL".to_string(), self.use_ssl.to_string()),
        ];
        if let Some(ref user) = self.username {
            env.push(("ES_USERNAME".to_string(), user.clone()));
        }
        if let Some(ref pass) = self.password {
            env.push(("ES_PASSWORD".to_string(), pass.clone()));
        }
        env
    }
}

/// `[test]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestSection {
    /// Directory for temporary rule files. Created on first use.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

/// Validated engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub program: String,
    pub install_path: PathBuf,
    pub config_file: String,
    pub stop_timeout: Duration,
}

impl EngineConfig {
    /// Full path of the engine's own config file.
    pub fn config_path(&self) -> PathBuf {
        self.install_path.join(&self.config_file)
    }

    /// `<subcommand> --config <install>/<config_file>`, the prefix shared by
    /// every engine invocation.
    pub fn base_args(&self, subcommand: &str) -> Vec<String> {
        vec![
            subcommand.to_string(),
            "--config".to_string(),
            self.config_path().to_string_lossy().into_owned(),
        ]
    }
}

/// Validated test-runner settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestConfig {
    pub scratch_dir: PathBuf,
}

impl TestConfig {
    pub fn default_scratch_dir() -> PathBuf {
        std::env::temp_dir().join("rulewarden-tests")
    }

    pub fn with_scratch_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            scratch_dir: dir.as_ref().to_path_buf(),
        }
    }
}

/// Validated configuration used by the rest of the crate.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineConfig,
    pub elasticsearch: ElasticsearchConfig,
    pub test: TestConfig,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        engine: EngineConfig,
        elasticsearch: ElasticsearchConfig,
        test: TestConfig,
    ) -> Self {
        Self {
            engine,
            elasticsearch,
            test,
        }
    }
}
