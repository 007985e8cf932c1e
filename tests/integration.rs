//! Integration tests for the crontab daemon.
//!
//! These tests verify end-to-end scenarios including:
//! - YAML configuration to task execution
//! - Retries and hooks across a whole job
//! - Web event dispatch through the HTTP surface

mod common;

mod integration {
    pub mod api;
    pub mod config;
    pub mod scenarios;
}
