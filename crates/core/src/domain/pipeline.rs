// Pipeline Domain Model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::job::Priority;

/// Priority a pipeline hands to jobs pushed without one
pub const DEFAULT_PIPELINE_PRIORITY: Priority = 10;

fn default_priority() -> Priority {
    DEFAULT_PIPELINE_PRIORITY
}

/// Named logical queue bound to one driver and a default priority.
///
/// Everything besides `name`, `driver` and `priority` is kept as
/// driver-specific options, e.g. `prefetch` for a broker or `retries`
/// for the ephemeral driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    #[serde(default)]
    name: String,
    #[serde(default)]
    driver: String,
    #[serde(default = "default_priority")]
    priority: Priority,
    #[serde(flatten)]
    options: Map<String, Value>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
            priority: DEFAULT_PIPELINE_PRIORITY,
            options: Map::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Attach a driver-specific option
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Driver type name (ie amqp, ephemeral, etc)
    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn has(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    pub fn string(&self, key: &str, default: &str) -> String {
        self.options
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    /// Integer option; numeric strings are accepted since env-sourced config arrives as text
    pub fn int(&self, key: &str, default: i64) -> i64 {
        match self.options.get(key) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn bool(&self, key: &str, default: bool) -> bool {
        match self.options.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}
