use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::Subscriber;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter};
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// How a single intake ended. Each outcome also counts as one intake request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    Completed,
    Malformed,
    EnrichmentUnavailable,
    Unclassified,
}

#[derive(Debug, Default)]
pub struct AppMetrics {
    intake_requests_total: AtomicU64,
    malformed_requests_total: AtomicU64,
    enrichment_failures_total: AtomicU64,
    unclassified_failures_total: AtomicU64,
    intakes_completed_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub intake_requests_total: u64,
    pub malformed_requests_total: u64,
    pub enrichment_failures_total: u64,
    pub unclassified_failures_total: u64,
    pub intakes_completed_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, outcome: IntakeOutcome) {
        self.intake_requests_total.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            IntakeOutcome::Completed => &self.intakes_completed_total,
            IntakeOutcome::Malformed => &self.malformed_requests_total,
            IntakeOutcome::EnrichmentUnavailable => &self.enrichment_failures_total,
            IntakeOutcome::Unclassified => &self.unclassified_failures_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.intake_requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            intake_requests_total: requests,
            malformed_requests_total: self.malformed_requests_total.load(Ordering::Relaxed),
            enrichment_failures_total: self.enrichment_failures_total.load(Ordering::Relaxed),
            unclassified_failures_total: self.unclassified_failures_total.load(Ordering::Relaxed),
            intakes_completed_total: self.intakes_completed_total.load(Ordering::Relaxed),
            avg_latency_millis: if requests == 0 {
                0.0
            } else {
                latency as f64 / requests as f64
            },
        }
    }
}

/// Where JSON log lines go. Commands that print results on stdout log to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
}

impl LogTarget {
    fn writer(self) -> BoxMakeWriter {
        match self {
            Self::Stdout => BoxMakeWriter::new(io::stdout),
            Self::Stderr => BoxMakeWriter::new(io::stderr),
        }
    }
}

/// `RUST_LOG` wins; otherwise the service and the intake pipeline log at info.
pub fn default_filter(service_name: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}=info,visitgate_api=info,visitgate_intake=info,visitgate_enrichment=info",
            service_name
        ))
    })
}

pub fn json_subscriber<W>(filter: EnvFilter, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(writer)
        .finish()
}

pub fn init_tracing(service_name: &str, target: LogTarget) {
    TRACING_INIT.get_or_init(|| {
        let subscriber = json_subscriber(default_filter(service_name), target.writer());
        if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("tracing already initialised: {error}");
        }
    });
}
