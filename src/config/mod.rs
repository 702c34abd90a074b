// src/config/mod.rs

//! Configuration loading and validation for rulewarden.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk and apply environment overrides (`loader.rs`).
//! - Validate it into the typed settings the supervisor and test runner use
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{apply_env_overrides, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, ElasticsearchConfig, EngineConfig, EngineSection, RawConfigFile, TestConfig,
    TestSection,
};
