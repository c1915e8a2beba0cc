//! Tunables for admission control and judge invocation.
//!
//! Plain structs with `Default` impls and builder-style setters; outer
//! layers own file/env parsing and hand resolved values down.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ClassifyError;

/// AIMD admission-control tunables, one set shared by every pool in a
/// registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Concurrency granted to a freshly created (or idle-reset) pool.
    pub initial_concurrency: u32,
    /// Floor for multiplicative decrease.
    pub min_concurrency: u32,
    /// Ceiling for additive increase.
    pub max_concurrency: u32,
    /// Consecutive successes required before concurrency grows by one.
    pub success_threshold: u32,
    /// Multiplier applied on a throttle signal (0 < factor < 1).
    pub decrease_factor: f64,
    /// Minimum spacing between two decreases; throttle signals inside the
    /// window are counted but do not shrink concurrency again.
    pub decrease_cooldown: Duration,
    /// Idle span after which the pool resets to `initial_concurrency`.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_concurrency: 10,
            min_concurrency: 1,
            max_concurrency: 50,
            success_threshold: 10,
            decrease_factor: 0.5,
            decrease_cooldown: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    pub fn initial_concurrency(mut self, n: u32) -> Self {
        self.initial_concurrency = n;
        self
    }

    pub fn min_concurrency(mut self, n: u32) -> Self {
        self.min_concurrency = n;
        self
    }

    pub fn max_concurrency(mut self, n: u32) -> Self {
        self.max_concurrency = n;
        self
    }

    pub fn success_threshold(mut self, n: u32) -> Self {
        self.success_threshold = n;
        self
    }

    pub fn decrease_factor(mut self, factor: f64) -> Self {
        self.decrease_factor = factor;
        self
    }

    pub fn decrease_cooldown(mut self, window: Duration) -> Self {
        self.decrease_cooldown = window;
        self
    }

    pub fn idle_timeout(mut self, span: Duration) -> Self {
        self.idle_timeout = span;
        self
    }

    /// Reject configurations that would violate the pool invariant
    /// `min ≤ current ≤ max`.
    pub fn validate(&self) -> Result<(), ClassifyError> {
        if self.min_concurrency == 0 {
            return Err(ClassifyError::InvalidConfig(
                "min_concurrency must be at least 1".into(),
            ));
        }
        if self.min_concurrency > self.max_concurrency {
            return Err(ClassifyError::InvalidConfig(format!(
                "min_concurrency {} exceeds max_concurrency {}",
                self.min_concurrency, self.max_concurrency
            )));
        }
        if self.initial_concurrency < self.min_concurrency
            || self.initial_concurrency > self.max_concurrency
        {
            return Err(ClassifyError::InvalidConfig(format!(
                "initial_concurrency {} outside [{}, {}]",
                self.initial_concurrency, self.min_concurrency, self.max_concurrency
            )));
        }
        if !(self.decrease_factor > 0.0 && self.decrease_factor < 1.0) {
            return Err(ClassifyError::InvalidConfig(format!(
                "decrease_factor {} must be in (0, 1)",
                self.decrease_factor
            )));
        }
        Ok(())
    }
}

/// Per-judge invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Sampling temperature; kept low so identical conversations produce
    /// near-identical verdicts.
    pub temperature: f64,
    /// Output cap for a single judge response.
    pub max_tokens: u32,
    /// Capability tag forwarded to the model selector.
    pub required_capability: String,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 1024,
            required_capability: "risk_classification".into(),
        }
    }
}

impl JudgeConfig {
    pub fn temperature(mut self, t: f64) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn required_capability(mut self, tag: impl Into<String>) -> Self {
        self.required_capability = tag.into();
        self
    }
}
