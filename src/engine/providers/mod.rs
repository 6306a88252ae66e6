// Kilo Engine — LLM Providers
// Provider adapters behind one golden trait: `is_available()` +
// `complete()`. Dialect mapping stays inside each adapter; the gateway
// only decides routing, thinking, and failover.
//
// Availability is backed by a per-instance circuit breaker (5 consecutive
// failures → fail fast for 60 s) plus a configured-key check, which is
// what routes traffic to the fallback while a provider is misbehaving.

mod anthropic;
mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use crate::atoms::constants::THINKING_SUMMARY_CAP;
use crate::atoms::error::EngineResult;
use crate::atoms::types::{ChatMessage, LlmResponse, ToolSpec};

// ── Request ─────────────────────────────────────────────────────────────

/// A fully resolved provider request: the gateway has already applied
/// route defaults, thinking rules, and the timeout ceiling.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub max_tokens: u32,
    /// Must be None whenever thinking is set (provider contract).
    pub temperature: Option<f64>,
    /// Extended-thinking token budget.
    pub thinking_budget: Option<u32>,
    /// Set when thinking and tools are both present — the primary request
    /// must carry the provider's capability beta header.
    pub thinking_with_tools: bool,
    pub timeout: Duration,
}

// ── Golden trait ────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Configured and not currently circuit-broken.
    fn is_available(&self) -> bool;

    async fn complete(&self, request: &ProviderRequest) -> EngineResult<LlmResponse>;
}

// ── Circuit breaker ─────────────────────────────────────────────────────

/// Trips after N consecutive failures, then rejects for a cooldown period
/// before allowing a probe request through. Per-provider-instance state,
/// so engines can init → shutdown → re-init freely in tests.
pub struct CircuitBreaker {
    consecutive_failures: AtomicU32,
    tripped_at: AtomicU64,
    threshold: u32,
    cooldown_secs: u64,
}

impl CircuitBreaker {
    pub const fn new(threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            tripped_at: AtomicU64::new(0),
            threshold,
            cooldown_secs,
        }
    }

    /// True when requests may pass (closed, or cooldown expired).
    pub fn is_closed(&self) -> bool {
        let failures = self.consecutive_failures.load(Ordering::Relaxed);
        if failures < self.threshold {
            return true;
        }
        let tripped = self.tripped_at.load(Ordering::Relaxed);
        now_epoch_secs().saturating_sub(tripped) >= self.cooldown_secs
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.tripped_at.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        let prev = self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        if prev + 1 >= self.threshold {
            self.tripped_at.store(now_epoch_secs(), Ordering::Relaxed);
            log::warn!(
                "[provider] circuit tripped after {} consecutive failures, cooling down {}s",
                prev + 1,
                self.cooldown_secs
            );
        }
    }
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Shared helpers ──────────────────────────────────────────────────────

/// Concatenate thinking blocks into the opaque ≤500-char display summary.
pub(crate) fn summarize_thinking(blocks: &[String]) -> Option<String> {
    if blocks.is_empty() {
        return None;
    }
    let mut joined = blocks.join("\n");
    if joined.chars().count() > THINKING_SUMMARY_CAP {
        joined = joined.chars().take(THINKING_SUMMARY_CAP).collect();
    }
    Some(joined)
}
