// DELAY step handler

use async_trait::async_trait;
use std::time::Duration;
use stepline_contracts::DelayStepConfig;

use super::StepHandler;
use crate::error::{EngineError, Result};

/// Sleeps for `config.seconds` (default 1). The sleep is cooperative, so a
/// long delay only parks this run's scheduling task.
#[derive(Debug, Default, Clone, Copy)]
pub struct DelayHandler;

impl DelayHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepHandler for DelayHandler {
    async fn execute(&self, config: &serde_json::Value) -> Result<()> {
        let config =
            DelayStepConfig::from_value(config).map_err(|e| EngineError::validation(e.0))?;

        tokio::time::sleep(Duration::from_secs_f64(config.seconds)).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn zero_seconds_completes_immediately() {
        let started = std::time::Instant::now();
        DelayHandler::new()
            .execute(&json!({"seconds": 0}))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn negative_seconds_is_a_validation_error() {
        let err = DelayHandler::new()
            .execute(&json!({"seconds": -1}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_config_defaults_to_one_second() {
        tokio::time::pause();
        let handler = DelayHandler::new();
        let sleep = handler.execute(&serde_json::Value::Null);
        tokio::pin!(sleep);

        // Not done before the default one-second delay has elapsed.
        assert!(
            tokio::time::timeout(Duration::from_millis(500), sleep.as_mut())
                .await
                .is_err()
        );
        tokio::time::timeout(Duration::from_millis(600), sleep)
            .await
            .unwrap()
            .unwrap();
    }
}
