#![allow(dead_code)]

use std::path::Path;

use rulewarden::config::{
    ConfigFile, ElasticsearchConfig, EngineSection, RawConfigFile, TestSection,
};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Defaults: program `engine`, install path `/opt/engine`, a short stop
/// timeout and a scratch dir under `/scratch`.
pub struct ConfigBuilder {
    config: RawConfigFile,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                engine: EngineSection {
                    program: "engine".to_string(),
                    install_path: "/opt/engine".into(),
                    config_file: "config.yaml".to_string(),
                    stop_timeout: "200ms".to_string(),
                },
                elasticsearch: ElasticsearchConfig::default(),
                test: TestSection {
                    scratch_dir: Some("/scratch".into()),
                },
            },
        }
    }

    pub fn program(mut self, program: &str) -> Self {
        self.config.engine.program = program.to_string();
        self
    }

    pub fn install_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.engine.install_path = path.as_ref().to_path_buf();
        self
    }

    pub fn config_file(mut self, name: &str) -> Self {
        self.config.engine.config_file = name.to_string();
        self
    }

    pub fn stop_timeout(mut self, timeout: &str) -> Self {
        self.config.engine.stop_timeout = timeout.to_string();
        self
    }

    pub fn es_host(mut self, host: &str, port: u16) -> Self {
        self.config.elasticsearch.host = host.to_string();
        self.config.elasticsearch.port = port;
        self
    }

    pub fn es_ssl(mut self, use_ssl: bool) -> Self {
        self.config.elasticsearch.use_ssl = use_ssl;
        self
    }

    pub fn es_credentials(mut self, username: &str, password: &str) -> Self {
        self.config.elasticsearch.username = Some(username.to_string());
        self.config.elasticsearch.password = Some(password.to_string());
        self
    }

    pub fn scratch_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.test.scratch_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
