//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by debate-forge and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all debate-forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total chat-completion requests, labeled by model and status.
pub static LLM_REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Chat-completion latency in seconds (including retries), labeled by model.
pub static LLM_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Total embedding requests, labeled by model and status.
pub static EMBEDDING_REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Embedding request latency in seconds, labeled by model.
pub static EMBEDDING_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Strategist interventions, labeled by judged discussion state.
pub static STRATEGIST_INTERVENTIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Number of candidate continuations generated per intervention.
pub static STRATEGIST_CANDIDATES: OnceLock<Histogram> = OnceLock::new();

/// Score of the winning candidate per intervention.
pub static STRATEGIST_BEST_SCORE: OnceLock<Histogram> = OnceLock::new();

/// Debate rounds finished, labeled by outcome.
pub static DEBATES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Transcript messages pushed, labeled by message type.
pub static MESSAGES_PUSHED_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Transcript messages revealed to viewers.
pub static MESSAGES_REVEALED_TOTAL: OnceLock<Counter> = OnceLock::new();

/// Connected websocket viewers across all rooms.
pub static ACTIVE_VIEWERS: OnceLock<Gauge> = OnceLock::new();

/// Rooms currently registered.
pub static ROOMS: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Later calls leave the first registry in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    // LLM metrics
    let llm_requests_total = CounterVec::new(
        Opts::new("debate_forge_llm_requests_total", "Total chat-completion requests"),
        &["model", "status"],
    )?;

    let llm_latency = HistogramVec::new(
        HistogramOpts::new(
            "debate_forge_llm_latency_seconds",
            "Chat-completion latency in seconds",
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["model"],
    )?;

    // Embedding metrics
    let embedding_requests_total = CounterVec::new(
        Opts::new(
            "debate_forge_embedding_requests_total",
            "Total embedding requests",
        ),
        &["model", "status"],
    )?;

    let embedding_latency = HistogramVec::new(
        HistogramOpts::new(
            "debate_forge_embedding_latency_seconds",
            "Embedding request latency in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["model"],
    )?;

    // Strategist metrics
    let strategist_interventions_total = CounterVec::new(
        Opts::new(
            "debate_forge_strategist_interventions_total",
            "Strategist interventions by discussion state",
        ),
        &["state"],
    )?;

    let strategist_candidates = Histogram::with_opts(
        HistogramOpts::new(
            "debate_forge_strategist_candidates",
            "Candidate continuations generated per intervention",
        )
        .buckets(vec![1.0, 2.0, 3.0, 4.0, 6.0, 8.0, 12.0]),
    )?;

    let strategist_best_score = Histogram::with_opts(
        HistogramOpts::new(
            "debate_forge_strategist_best_score",
            "Score of the selected candidate",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5]),
    )?;

    // Session metrics
    let debates_total = CounterVec::new(
        Opts::new("debate_forge_debates_total", "Debate rounds finished"),
        &["outcome"],
    )?;

    let messages_pushed_total = CounterVec::new(
        Opts::new(
            "debate_forge_messages_pushed_total",
            "Transcript messages pushed",
        ),
        &["type"],
    )?;

    let messages_revealed_total = Counter::new(
        "debate_forge_messages_revealed_total",
        "Transcript messages revealed to viewers",
    )?;

    let active_viewers = Gauge::new(
        "debate_forge_active_viewers",
        "Connected websocket viewers",
    )?;

    let rooms = Gauge::new("debate_forge_rooms", "Rooms currently registered")?;

    registry.register(Box::new(llm_requests_total.clone()))?;
    registry.register(Box::new(llm_latency.clone()))?;
    registry.register(Box::new(embedding_requests_total.clone()))?;
    registry.register(Box::new(embedding_latency.clone()))?;
    registry.register(Box::new(strategist_interventions_total.clone()))?;
    registry.register(Box::new(strategist_candidates.clone()))?;
    registry.register(Box::new(strategist_best_score.clone()))?;
    registry.register(Box::new(debates_total.clone()))?;
    registry.register(Box::new(messages_pushed_total.clone()))?;
    registry.register(Box::new(messages_revealed_total.clone()))?;
    registry.register(Box::new(active_viewers.clone()))?;
    registry.register(Box::new(rooms.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = LLM_REQUESTS_TOTAL.set(llm_requests_total);
    let _ = LLM_LATENCY.set(llm_latency);
    let _ = EMBEDDING_REQUESTS_TOTAL.set(embedding_requests_total);
    let _ = EMBEDDING_LATENCY.set(embedding_latency);
    let _ = STRATEGIST_INTERVENTIONS_TOTAL.set(strategist_interventions_total);
    let _ = STRATEGIST_CANDIDATES.set(strategist_candidates);
    let _ = STRATEGIST_BEST_SCORE.set(strategist_best_score);
    let _ = DEBATES_TOTAL.set(debates_total);
    let _ = MESSAGES_PUSHED_TOTAL.set(messages_pushed_total);
    let _ = MESSAGES_REVEALED_TOTAL.set(messages_revealed_total);
    let _ = ACTIVE_VIEWERS.set(active_viewers);
    let _ = ROOMS.set(rooms);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line when the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

/// HTTP handler for the /metrics endpoint.
pub async fn metrics_handler() -> String {
    export_metrics()
}
