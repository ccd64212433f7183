// HTTP transport over a pooled reqwest client
use crate::domain::error::RegistryError;
use crate::domain::traits::{RemoteReply, RemoteRequest, RemoteTransport, TransportError};
use crate::infrastructure::config::RemoteConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Create the shared HTTP client with pool and timeout settings
pub fn create_client(config: &RemoteConfig) -> Result<Client, RegistryError> {
    Ok(Client::builder()
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(30))
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .user_agent(config.user_agent.as_str())
        .build()?)
}

pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn get(&self, request: &RemoteRequest) -> Result<RemoteReply, TransportError> {
        let response = self
            .client
            .get(self.url(&request.path))
            .query(&request.query)
            .timeout(request.timeout)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify)?;
        Ok(RemoteReply {
            status,
            body: body.to_vec(),
        })
    }
}
