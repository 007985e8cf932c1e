//! Core building blocks shared by every job.
//!
//! Identifiers, the first-match registry, trigger payloads, the per-attempt
//! execution scope and the retry, timeout, hook and concurrency primitives
//! the executors are assembled from.

pub mod concurrency;
pub mod duration;
pub mod event_data;
pub mod hooked;
pub mod job;
pub mod registry;
pub mod retry;
pub mod schedule;
pub mod scope;
pub mod task;
pub mod timeout;
pub mod types;
