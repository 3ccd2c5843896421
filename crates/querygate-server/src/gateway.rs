use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use querygate_contracts::{
    AuditAction, AuditStatus, ChartResponse, ChatRequest, NormalizedResponse,
};
use querygate_kernel::{normalize_chart, normalize_chat, tag_tenant};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::task::JoinError;

use crate::audit::AuditJsonl;
use crate::engine::{ChartEngine, ConversationEngine, EngineError};
use crate::error::ApiError;

const CHAT_FAILURE_MESSAGE: &str = "An error occurred while processing your request.";
const CHART_FAILURE_MESSAGE: &str = "An error occurred while processing your chart request.";
const TIMEOUT_MESSAGE: &str = "The engine did not answer in time.";

#[derive(Debug, Error)]
enum EngineFailure {
    #[error("{0}")]
    Raised(String),
    #[error("engine panicked: {0}")]
    Panicked(String),
    #[error("engine call timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
}

impl EngineFailure {
    fn into_api_error(self, message: &'static str) -> ApiError {
        match self {
            EngineFailure::TimedOut(_) => ApiError::EngineTimeout {
                message: TIMEOUT_MESSAGE,
                details: self.to_string(),
            },
            _ => ApiError::EngineFailure {
                message,
                details: self.to_string(),
            },
        }
    }
}

pub struct ChatGateway {
    engine: Arc<dyn ConversationEngine>,
    audit: Arc<AuditJsonl>,
    deadline: Duration,
}

impl ChatGateway {
    pub fn new(
        engine: Arc<dyn ConversationEngine>,
        audit: Arc<AuditJsonl>,
        deadline: Duration,
    ) -> Self {
        Self {
            engine,
            audit,
            deadline,
        }
    }

    /// One chat turn. Exactly one audit record is written whatever the outcome.
    pub async fn handle(&self, request: ChatRequest) -> Result<NormalizedResponse, ApiError> {
        let started = Instant::now();
        let tenant_id = request.tenant_id();
        let query = tag_tenant(&request.message, tenant_id);

        let engine = self.engine.clone();
        let engine_query = query.clone();
        let session_token = request.thread_id;
        let outcome = call_with_deadline(self.deadline, async move {
            engine
                .run_conversational_query(&engine_query, tenant_id, session_token.as_deref())
                .await
        })
        .await;

        match outcome {
            Ok(result) => {
                let (response, status) = normalize_chat(&result, tenant_id);
                tracing::info!(tenant_id, status = status.as_str(), "chat query answered");
                let mut details = audit_details(&query, started);
                if status == AuditStatus::Error {
                    details.insert("error".to_string(), Value::from(result.error.clone()));
                }
                self.audit
                    .record(AuditAction::ChatQuery, tenant_id, details, status)
                    .await;
                Ok(response)
            }
            Err(failure) => {
                tracing::error!(error = %failure, tenant_id, "chat engine call failed");
                let mut details = audit_details(&query, started);
                details.insert("error".to_string(), Value::String(failure.to_string()));
                self.audit
                    .record(
                        AuditAction::ChatQuery,
                        tenant_id,
                        details,
                        AuditStatus::Failure,
                    )
                    .await;
                Err(failure.into_api_error(CHAT_FAILURE_MESSAGE))
            }
        }
    }
}

pub struct ChartGateway {
    engine: Arc<dyn ChartEngine>,
    audit: Arc<AuditJsonl>,
    deadline: Duration,
}

impl ChartGateway {
    pub fn new(engine: Arc<dyn ChartEngine>, audit: Arc<AuditJsonl>, deadline: Duration) -> Self {
        Self {
            engine,
            audit,
            deadline,
        }
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<ChartResponse, ApiError> {
        let started = Instant::now();
        let tenant_id = request.tenant_id();
        let query = tag_tenant(&request.message, tenant_id);

        let engine = self.engine.clone();
        let engine_query = query.clone();
        let session_token = request.thread_id;
        let outcome = call_with_deadline(self.deadline, async move {
            engine
                .run_chart_generation(&engine_query, tenant_id, session_token.as_deref())
                .await
        })
        .await;

        match outcome {
            Ok(result) => {
                let (response, status) = normalize_chart(&result, tenant_id);
                tracing::info!(tenant_id, status = status.as_str(), "chart generated");
                let mut details = audit_details(&query, started);
                if status == AuditStatus::Error {
                    details.insert("error".to_string(), Value::from(result.error.clone()));
                }
                self.audit
                    .record(AuditAction::ChartGeneration, tenant_id, details, status)
                    .await;
                Ok(response)
            }
            Err(failure) => {
                tracing::error!(error = %failure, tenant_id, "chart engine call failed");
                let mut details = audit_details(&query, started);
                details.insert("error".to_string(), Value::String(failure.to_string()));
                self.audit
                    .record(
                        AuditAction::ChartGeneration,
                        tenant_id,
                        details,
                        AuditStatus::Failure,
                    )
                    .await;
                Err(failure.into_api_error(CHART_FAILURE_MESSAGE))
            }
        }
    }
}

fn audit_details(query: &str, started: Instant) -> Map<String, Value> {
    let mut details = Map::new();
    details.insert("query".to_string(), Value::String(query.to_string()));
    details.insert(
        "latency_ms".to_string(),
        Value::from(started.elapsed().as_millis() as u64),
    );
    details
}

/// Runs the engine call on its own task so a panic surfaces as a failure and a
/// missed deadline aborts the call.
async fn call_with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, EngineFailure>
where
    T: Send + 'static,
    F: Future<Output = Result<T, EngineError>> + Send + 'static,
{
    let mut task = tokio::spawn(call);
    match tokio::time::timeout(deadline, &mut task).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => Err(EngineFailure::Raised(e.to_string())),
        Ok(Err(join)) => Err(EngineFailure::Panicked(join_message(join))),
        Err(_elapsed) => {
            task.abort();
            Err(EngineFailure::TimedOut(deadline))
        }
    }
}

fn join_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "engine task cancelled".to_string();
    }
    panic_message(err.into_panic())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown panic".to_string()),
    }
}
