// HTTP step handler

use async_trait::async_trait;
use stepline_contracts::HttpStepConfig;
use tracing::debug;

use super::StepHandler;
use crate::error::{EngineError, Result};

/// Issues an outbound request to `config.url` with `config.method`
/// (default GET). Anything but a 2xx response is a step failure, with the
/// status code in the failure message. Timeouts are whatever the client
/// defaults provide.
#[derive(Debug, Clone, Default)]
pub struct HttpHandler {
    client: reqwest::Client,
}

impl HttpHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl StepHandler for HttpHandler {
    async fn execute(&self, config: &serde_json::Value) -> Result<()> {
        let config = HttpStepConfig::from_value(config).map_err(|e| EngineError::validation(e.0))?;

        let method: reqwest::Method = config
            .method
            .to_uppercase()
            .parse()
            .map_err(|_| EngineError::validation(format!("invalid HTTP method: {}", config.method)))?;

        debug!(method = %method, url = %config.url, "Issuing HTTP step request");

        let response = self
            .client
            .request(method.clone(), &config.url)
            .send()
            .await
            .map_err(|e| {
                EngineError::execution(format!("HTTP {} {} failed: {}", method, config.url, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::execution(format!(
                "HTTP {} {} returned status {}",
                method,
                config.url,
                status.as_u16()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_url_is_a_validation_error() {
        let err = HttpHandler::new().execute(&json!({})).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(err.to_string().contains("url"));
    }

    #[tokio::test]
    async fn bogus_method_is_a_validation_error() {
        let err = HttpHandler::new()
            .execute(&json!({"url": "http://localhost:9", "method": "NOT A METHOD"}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_an_execution_error() {
        // Port 9 (discard) on localhost refuses connections.
        let err = HttpHandler::new()
            .execute(&json!({"url": "http://127.0.0.1:9/nope"}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StepExecution(_)));
    }
}
