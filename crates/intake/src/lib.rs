mod validate;

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use visitgate_core::{DecisionEngine, Evaluation, IntakeResponse};
use visitgate_enrichment::{Enricher, EnrichmentError};
use tokio::task::JoinHandle;
use visitgate_observability::{AppMetrics, IntakeOutcome};

pub use validate::{parse_body, parse_envelope, parse_payload, MalformedRequest};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    MalformedRequest(#[from] MalformedRequest),
    #[error(transparent)]
    EnrichmentUnavailable(#[from] EnrichmentError),
    #[error("intake failed unexpectedly: {0}")]
    Unclassified(String),
}

impl IntakeError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRequest(_) => "malformed_request",
            Self::EnrichmentUnavailable(_) => "enrichment_unavailable",
            Self::Unclassified(_) => "unclassified",
        }
    }
}

/// Validate, classify, then rewrite the explanation. Enrichment is never
/// skipped and its failure fails the whole intake.
pub struct IntakeOrchestrator<E>
where
    E: Enricher,
{
    engine: DecisionEngine,
    enricher: E,
    metrics: Arc<AppMetrics>,
}

impl<E> IntakeOrchestrator<E>
where
    E: Enricher,
{
    pub fn new(engine: DecisionEngine, enricher: E, metrics: Arc<AppMetrics>) -> Self {
        Self {
            engine,
            enricher,
            metrics,
        }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn enricher(&self) -> &E {
        &self.enricher
    }

    pub fn metrics(&self) -> &Arc<AppMetrics> {
        &self.metrics
    }

    /// Deterministic half only: validates an envelope and classifies it.
    pub fn classify(&self, raw: &Value) -> Result<Evaluation, IntakeError> {
        let envelope = parse_envelope(raw)?;
        Ok(self.engine.evaluate(&envelope.payload))
    }

    #[instrument(skip(self, raw), fields(intake_id = %Uuid::new_v4()))]
    pub async fn handle(&self, raw: Value) -> Result<IntakeResponse, IntakeError> {
        let started = Instant::now();
        let result = self.run(&raw).await;
        self.metrics.observe_latency(started.elapsed());

        match &result {
            Ok(response) => {
                self.metrics.record(IntakeOutcome::Completed);
                info!(
                    policy_id = %response.policy_id,
                    decision = response.decision.as_str(),
                    route = response.route.as_str(),
                    model = %response.model_used,
                    "intake handled"
                );
            }
            Err(IntakeError::MalformedRequest(reason)) => {
                self.metrics.record(IntakeOutcome::Malformed);
                warn!(reason = %reason, "intake rejected");
            }
            Err(IntakeError::EnrichmentUnavailable(cause)) => {
                self.metrics.record(IntakeOutcome::EnrichmentUnavailable);
                warn!(kind = cause.kind(), error = %cause, "enrichment unavailable, intake failed");
            }
            Err(IntakeError::Unclassified(detail)) => {
                self.metrics.record(IntakeOutcome::Unclassified);
                error!(detail = %detail, "intake failed");
            }
        }

        result
    }

    async fn run(&self, raw: &Value) -> Result<IntakeResponse, IntakeError> {
        let envelope = parse_envelope(raw)?;
        let evaluation = self.engine.evaluate(&envelope.payload);
        info!(
            source = envelope.source.as_str(),
            visitor_id = %envelope.payload.visitor_id,
            policy_id = %evaluation.policy_id,
            "visit classified"
        );

        let enriched = self.enricher.enhance(&evaluation.explanation).await?;
        Ok(IntakeResponse::compose(evaluation, enriched))
    }
}

impl<E> IntakeOrchestrator<E>
where
    E: Enricher + 'static,
{
    /// Runs [`Self::handle`] on its own task so a panic inside the pipeline
    /// becomes [`IntakeError::Unclassified`] instead of tearing down the caller.
    /// Dropping the returned future aborts the task, outbound call included.
    pub async fn handle_isolated(self: Arc<Self>, raw: Value) -> Result<IntakeResponse, IntakeError> {
        let metrics = self.metrics.clone();
        let mut task = AbortOnDrop(tokio::spawn(async move { self.handle(raw).await }));
        match (&mut task.0).await {
            Ok(result) => result,
            Err(join_error) => {
                metrics.record(IntakeOutcome::Unclassified);
                error!(error = %join_error, "intake task aborted");
                Err(IntakeError::Unclassified(join_error.to_string()))
            }
        }
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
