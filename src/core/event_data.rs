//! Trigger notification payload.
//!
//! Every event generator emits [`EventData`]: the name of the emitter plus a
//! free-form bag of extras (which cron expression fired, which log line
//! matched, which container action was seen). The payload is handed to the
//! template layer when commands are rendered and is never persisted.

use serde::Serialize;
use serde_json::{Map, Value};

/// Key under which the emitter name is exposed to templates.
pub const EMITTER_KEY: &str = "emitter";

/// Key under which an error description is stored by [`EventData::from_error`].
pub const ERROR_KEY: &str = "error";

/// Payload of one trigger notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventData {
    emitter: String,
    extra: Map<String, Value>,
}

impl EventData {
    /// Create an event with no extras.
    pub fn new(emitter: impl Into<String>) -> Self {
        Self {
            emitter: emitter.into(),
            extra: Map::new(),
        }
    }

    /// Create an event carrying an error description.
    pub fn from_error(emitter: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::new(emitter).with(ERROR_KEY, error.to_string())
    }

    /// Builder: attach an extra value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Name of the generator that produced this event.
    pub fn emitter(&self) -> &str {
        &self.emitter
    }

    /// Look up an extra value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// All extras, without the emitter.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Flattened view used as template context: extras plus `emitter`.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.extra.clone();
        map.insert(EMITTER_KEY.to_string(), Value::String(self.emitter.clone()));
        map
    }

    /// Positional form handed to commands: the emitter, then one `key=value`
    /// per extra in key order. String values are unquoted.
    pub fn arguments(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.extra.len() + 1);
        args.push(self.emitter.clone());
        for (key, value) in &self.extra {
            match value {
                Value::String(s) => args.push(format!("{}={}", key, s)),
                other => args.push(format!("{}={}", key, other)),
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_map_includes_emitter() {
        let data = EventData::new("cron").with("cron", "* * * * * *");
        let map = data.to_map();

        assert_eq!(map["emitter"], json!("cron"));
        assert_eq!(map["cron"], json!("* * * * * *"));
        assert_eq!(data.extra().len(), 1);
    }

    #[test]
    fn test_emitter_overrides_extra_key() {
        let data = EventData::new("init").with("emitter", "spoofed");

        assert_eq!(data.to_map()["emitter"], json!("init"));
    }

    #[test]
    fn test_arguments_are_sorted_pairs() {
        let data = EventData::new("log-file")
            .with("line", "disk full")
            .with("code", 28);

        assert_eq!(data.arguments(), vec!["log-file", "code=28", "line=disk full"]);
    }

    #[test]
    fn test_from_error() {
        let data = EventData::from_error("docker", "connection refused");

        assert_eq!(data.emitter(), "docker");
        assert_eq!(data.get(ERROR_KEY), Some(&json!("connection refused")));
    }
}
