//! Infrastructure reliability: retries, fallback chains and load balancing.
//!
//! These address an unreliable provider (timeouts, 5xx, 429), not an
//! ambiguous user request.  [`FallbackModel`] and [`LoadBalancedModel`] are
//! themselves [`LanguageModel`]s, so a load-balanced group can be the first
//! link of a fallback chain.

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::llm::model::{LanguageModel, SharedModel};
use crate::llm::types::{ChatRequest, Completion};

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Re-runs a failing async operation with a delay between attempts.
#[derive(Debug, Clone)]
pub struct RetryManager {
    /// Total attempts, including the first.
    pub max_retries: u32,
    /// Delay before the second attempt.
    pub delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_factor: f64,
    /// Upper bound for the delay.
    pub max_delay: Duration,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(1000),
            backoff_factor: 1.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryManager {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, factor: f64, max_delay: Duration) -> Self {
        self.backoff_factor = factor;
        self.max_delay = max_delay;
        self
    }

    /// `delay` scaled by the backoff factor, capped at `max_delay`.  A
    /// negative or NaN product becomes zero.
    fn next_delay(&self, delay: Duration) -> Duration {
        let scaled = (delay.as_secs_f64() * self.backoff_factor).min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(scaled).unwrap_or(Duration::ZERO)
    }

    /// Run `operation` until it succeeds or the attempts are used up.
    ///
    /// Sleeps only between attempts.  The final error is wrapped in
    /// [`AgentError::RetriesExhausted`].
    pub async fn execute<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_retries.max(1);
        let mut delay = self.delay;
        let mut attempt = 1;

        loop {
            debug!(operation = operation_name, attempt, attempts, "attempt starting");
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation = operation_name, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        operation = operation_name,
                        attempt,
                        attempts,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = self.next_delay(delay);
                    attempt += 1;
                }
                Err(e) => {
                    warn!(operation = operation_name, attempts, error = %e, "all attempts failed");
                    return Err(AgentError::RetriesExhausted {
                        operation: operation_name.to_owned(),
                        attempts,
                        last_error: Box::new(e),
                    });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

/// How long a model is skipped after a rate-limit error.
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(120);

/// Tries models in order and returns the first success.
///
/// When streaming, a model that fails after emitting text ends the call
/// with its error; the next model is only tried while nothing has reached
/// the caller.  A model that fails with a rate-limit error is put on cooldown and
/// skipped by later calls while the cooldown lasts, unless every model is
/// cooling down.
pub struct FallbackModel {
    models: Vec<SharedModel>,
    cooldown: Duration,
    cooling_until: Mutex<Vec<Option<Instant>>>,
}

impl FallbackModel {
    pub fn new(models: Vec<SharedModel>) -> Result<Self> {
        if models.is_empty() {
            return Err(AgentError::NoModelsAvailable {
                reason: "fallback chain is empty".into(),
            });
        }
        Ok(Self {
            cooling_until: Mutex::new(vec![None; models.len()]),
            models,
            cooldown: RATE_LIMIT_COOLDOWN,
        })
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Indices to try, in order: models not cooling down, or all of them
    /// when every model is.
    fn candidates(&self) -> Vec<usize> {
        let now = Instant::now();
        let ready: Vec<usize> = match self.cooling_until.lock() {
            Ok(until) => (0..self.models.len())
                .filter(|i| until[*i].is_none_or(|t| t <= now))
                .collect(),
            Err(_) => (0..self.models.len()).collect(),
        };
        if ready.is_empty() {
            (0..self.models.len()).collect()
        } else {
            ready
        }
    }

    fn mark_rate_limited(&self, index: usize) {
        warn!(
            model_id = self.models[index].model_id(),
            cooldown_secs = self.cooldown.as_secs(),
            "model rate-limited, cooling down"
        );
        if let Ok(mut until) = self.cooling_until.lock() {
            until[index] = Some(Instant::now() + self.cooldown);
        }
    }

    fn record_failure(&self, index: usize, error: &AgentError) {
        warn!(
            model_id = self.models[index].model_id(),
            error = %error,
            "model failed, trying next"
        );
        if error.is_rate_limited() {
            self.mark_rate_limited(index);
        }
    }
}

#[async_trait]
impl LanguageModel for FallbackModel {
    fn model_id(&self) -> &str {
        self.models[0].model_id()
    }

    async fn chat(&self, request: &ChatRequest) -> Result<Completion> {
        let mut last_error = None;
        for index in self.candidates() {
            match self.models[index].chat(request).await {
                Ok(done) => return Ok(done),
                Err(e) => {
                    self.record_failure(index, &e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| AgentError::NoModelsAvailable {
            reason: "no fallback candidate".into(),
        }))
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        on_text: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<Completion> {
        let mut last_error = None;
        for index in self.candidates() {
            let mut emitted = false;
            let result = {
                let mut forward = |text: &str| {
                    emitted = true;
                    on_text(text);
                };
                self.models[index].stream_chat(request, &mut forward).await
            };
            match result {
                Ok(done) => return Ok(done),
                Err(e) if emitted => {
                    warn!(
                        model_id = self.models[index].model_id(),
                        error = %e,
                        "stream failed after partial output, not falling back"
                    );
                    if e.is_rate_limited() {
                        self.mark_rate_limited(index);
                    }
                    return Err(e);
                }
                Err(e) => {
                    self.record_failure(index, &e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| AgentError::NoModelsAvailable {
            reason: "no fallback candidate".into(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Load balancing
// ---------------------------------------------------------------------------

/// Spreads calls over a pool of equivalent models in round-robin order.
pub struct LoadBalancedModel {
    pool: Vec<SharedModel>,
    next: AtomicUsize,
}

impl LoadBalancedModel {
    pub fn new(pool: Vec<SharedModel>) -> Result<Self> {
        if pool.is_empty() {
            return Err(AgentError::NoModelsAvailable {
                reason: "load-balanced pool is empty".into(),
            });
        }
        Ok(Self {
            pool,
            next: AtomicUsize::new(0),
        })
    }

    /// The model that will serve the next call.
    pub fn pick(&self) -> &SharedModel {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        let model = &self.pool[index];
        debug!(model_id = model.model_id(), index, "load balancer selected model");
        model
    }
}

#[async_trait]
impl LanguageModel for LoadBalancedModel {
    fn model_id(&self) -> &str {
        self.pool[0].model_id()
    }

    async fn chat(&self, request: &ChatRequest) -> Result<Completion> {
        self.pick().chat(request).await
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        on_text: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<Completion> {
        self.pick().stream_chat(request, on_text).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
