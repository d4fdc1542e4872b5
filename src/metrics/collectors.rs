//! High-level recording interface over the Prometheus statics.
//!
//! Every method is a no-op until [`super::init_metrics`] has run, so library
//! code and tests can record unconditionally.

use super::prometheus::{
    ACTIVE_VIEWERS, DEBATES_TOTAL, EMBEDDING_LATENCY, EMBEDDING_REQUESTS_TOTAL, LLM_LATENCY,
    LLM_REQUESTS_TOTAL, MESSAGES_PUSHED_TOTAL, MESSAGES_REVEALED_TOTAL, ROOMS,
    STRATEGIST_BEST_SCORE, STRATEGIST_CANDIDATES, STRATEGIST_INTERVENTIONS_TOTAL,
};

/// How a debate round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebateOutcome {
    Completed,
    Replayed,
    Stopped,
    Failed,
}

impl DebateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Replayed => "replayed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

/// Metrics collector for debate-forge operational metrics.
///
/// ```ignore
/// use debate_forge::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
/// collector.record_llm_request("gpt-4o", true, 2.5);
/// collector.record_intervention("escalating", 3, 0.042);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record a chat-completion call, including its retries.
    pub fn record_llm_request(&self, model: &str, success: bool, latency_secs: f64) {
        let status = if success { "success" } else { "failure" };

        if let Some(requests) = LLM_REQUESTS_TOTAL.get() {
            requests.with_label_values(&[model, status]).inc();
        }
        if let Some(latency) = LLM_LATENCY.get() {
            latency.with_label_values(&[model]).observe(latency_secs);
        }

        tracing::trace!(
            model = model,
            status = status,
            latency_secs = latency_secs,
            "Recorded LLM request metric"
        );
    }

    /// Record one batched embedding call.
    pub fn record_embedding_request(&self, model: &str, success: bool, latency_secs: f64) {
        let status = if success { "success" } else { "failure" };

        if let Some(requests) = EMBEDDING_REQUESTS_TOTAL.get() {
            requests.with_label_values(&[model, status]).inc();
        }
        if let Some(latency) = EMBEDDING_LATENCY.get() {
            latency.with_label_values(&[model]).observe(latency_secs);
        }

        tracing::trace!(
            model = model,
            status = status,
            latency_secs = latency_secs,
            "Recorded embedding request metric"
        );
    }

    /// Record a strategist intervention.
    ///
    /// `state` is the judged discussion state, or "any" when no judge is
    /// configured.
    pub fn record_intervention(&self, state: &str, candidates: usize, best_score: f64) {
        if let Some(interventions) = STRATEGIST_INTERVENTIONS_TOTAL.get() {
            interventions.with_label_values(&[state]).inc();
        }
        if let Some(histogram) = STRATEGIST_CANDIDATES.get() {
            histogram.observe(candidates as f64);
        }
        if let Some(histogram) = STRATEGIST_BEST_SCORE.get() {
            histogram.observe(best_score);
        }

        tracing::trace!(
            state = state,
            candidates = candidates,
            best_score = best_score,
            "Recorded strategist intervention"
        );
    }

    pub fn record_debate(&self, outcome: DebateOutcome) {
        if let Some(debates) = DEBATES_TOTAL.get() {
            debates.with_label_values(&[outcome.as_str()]).inc();
        }
        tracing::trace!(outcome = outcome.as_str(), "Recorded debate outcome");
    }

    pub fn record_message_pushed(&self, message_type: &str) {
        if let Some(pushed) = MESSAGES_PUSHED_TOTAL.get() {
            pushed.with_label_values(&[message_type]).inc();
        }
    }

    pub fn record_message_revealed(&self) {
        if let Some(revealed) = MESSAGES_REVEALED_TOTAL.get() {
            revealed.inc();
        }
    }

    pub fn viewer_connected(&self) {
        if let Some(gauge) = ACTIVE_VIEWERS.get() {
            gauge.inc();
        }
    }

    pub fn viewer_disconnected(&self) {
        if let Some(gauge) = ACTIVE_VIEWERS.get() {
            gauge.dec();
        }
    }

    pub fn set_room_count(&self, count: usize) {
        if let Some(gauge) = ROOMS.get() {
            gauge.set(count as f64);
        }
    }
}
