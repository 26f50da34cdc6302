// Typed views over the opaque per-kind step configuration blob
//
// Step configs are stored as JSON and only interpreted when a handler runs,
// so a workflow definition can always be saved; malformed configuration
// surfaces as a step failure at execution time.

use serde::{Deserialize, Serialize};

/// Configuration could not be interpreted for its step kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepConfigError(pub String);

impl std::fmt::Display for StepConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StepConfigError {}

fn default_method() -> String {
    "GET".to_string()
}

fn default_seconds() -> f64 {
    1.0
}

/// Missing config is treated as an empty object so kind-level defaults apply.
fn normalize(config: &serde_json::Value) -> serde_json::Value {
    if config.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        config.clone()
    }
}

/// Config for an HTTP step: `url` is required, `method` defaults to GET.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpStepConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
}

impl HttpStepConfig {
    pub fn from_value(config: &serde_json::Value) -> Result<Self, StepConfigError> {
        serde_json::from_value(normalize(config))
            .map_err(|e| StepConfigError(format!("invalid HTTP step config: {}", e)))
    }
}

/// Config for a DELAY step: `seconds` defaults to 1 and must be non-negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayStepConfig {
    #[serde(default = "default_seconds")]
    pub seconds: f64,
}

impl DelayStepConfig {
    pub fn from_value(config: &serde_json::Value) -> Result<Self, StepConfigError> {
        let parsed: DelayStepConfig = serde_json::from_value(normalize(config))
            .map_err(|e| StepConfigError(format!("invalid delay step config: {}", e)))?;
        if !parsed.seconds.is_finite() || parsed.seconds < 0.0 {
            return Err(StepConfigError(format!(
                "delay seconds must be a non-negative number, got {}",
                parsed.seconds
            )));
        }
        Ok(parsed)
    }
}
