use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeFailure {
    #[error("health check answered {0}")]
    Status(StatusCode),
    #[error("health check timed out after {0:?}")]
    Timeout(Duration),
    #[error("health check could not connect: {0}")]
    Unreachable(String),
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, url: &Url, timeout: Duration) -> Result<(), ProbeFailure>;
}

/// GETs the health url and accepts any 2xx answer.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self, url: &Url, timeout: Duration) -> Result<(), ProbeFailure> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ProbeFailure::Timeout(timeout)
                } else {
                    ProbeFailure::Unreachable(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeFailure::Status(status));
        }
        Ok(())
    }
}
