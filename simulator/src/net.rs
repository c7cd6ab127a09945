use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::{Result, SimulationError};
use crate::types::EmissionPayload;

/// Outbound side of a firing: delivers one payload on behalf of a device.
#[async_trait]
pub trait Emitter: Send + Sync {
    async fn emit(&self, payload: &EmissionPayload, credential: &str) -> Result<()>;
}

pub struct HttpEmitter {
    client: Client,
    ingest_url: String,
}

impl HttpEmitter {
    pub fn new(ingest_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, ingest_url))
    }

    pub fn with_client(client: Client, ingest_url: impl Into<String>) -> Self {
        Self {
            client,
            ingest_url: ingest_url.into(),
        }
    }
}

#[async_trait]
impl Emitter for HttpEmitter {
    async fn emit(&self, payload: &EmissionPayload, credential: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.ingest_url)
            .bearer_auth(credential)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SimulationError::Emission {
                status: status.as_u16(),
            });
        }
        debug!(
            device_id = %payload.device_id,
            data_type = %payload.data_type,
            "reading ingested"
        );
        Ok(())
    }
}
