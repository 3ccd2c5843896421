use std::time::Duration;

use async_trait::async_trait;
use querygate_contracts::{ChartResult, EngineResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine transport error: {0}")]
    Transport(String),
    #[error("engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("engine response could not be decoded: {0}")]
    Decode(String),
    #[error("{0}")]
    Failed(String),
}

/// Conversational NL-to-SQL engine. Conversation memory lives behind it, keyed
/// by the session token.
#[async_trait]
pub trait ConversationEngine: Send + Sync {
    async fn run_conversational_query(
        &self,
        query: &str,
        tenant_id: i64,
        session_token: Option<&str>,
    ) -> Result<EngineResult, EngineError>;
}

#[async_trait]
pub trait ChartEngine: Send + Sync {
    async fn run_chart_generation(
        &self,
        query: &str,
        tenant_id: i64,
        session_token: Option<&str>,
    ) -> Result<ChartResult, EngineError>;
}

#[derive(Debug, Serialize)]
struct EngineRequest<'a> {
    query: &'a str,
    company_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_id: Option<&'a str>,
}

/// JSON-over-HTTP adapter for an engine deployed as its own service.
pub struct HttpEngine {
    endpoint: String,
    client: Client,
}

impl HttpEngine {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        query: &str,
        tenant_id: i64,
        session_token: Option<&str>,
    ) -> Result<T, EngineError> {
        let request = EngineRequest {
            query,
            company_id: tenant_id,
            thread_id: session_token,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| EngineError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ConversationEngine for HttpEngine {
    async fn run_conversational_query(
        &self,
        query: &str,
        tenant_id: i64,
        session_token: Option<&str>,
    ) -> Result<EngineResult, EngineError> {
        self.post(query, tenant_id, session_token).await
    }
}

#[async_trait]
impl ChartEngine for HttpEngine {
    async fn run_chart_generation(
        &self,
        query: &str,
        tenant_id: i64,
        session_token: Option<&str>,
    ) -> Result<ChartResult, EngineError> {
        self.post(query, tenant_id, session_token).await
    }
}
