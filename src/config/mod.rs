//! Configuration loading and parsing.
//!
//! This module provides the YAML model of the daemon configuration, its
//! loader and the validation run before any job starts. [`crontab`] turns a
//! classic crontab file into the same model.

pub mod crontab;
mod error;
mod types;
mod yaml;

pub use crontab::CrontabImport;
pub use error::ConfigError;
pub use types::{
    Config, DockerEventConfig, ErrorLimitPolicy, JobConfig, JobEvent, JobHooks, LogFormat,
    LogLevel, TaskConfig, TaskConnection, WebServerConfig,
};
pub use yaml::YamlLoader;
