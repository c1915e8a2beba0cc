//! Error taxonomy for the triage core.
//!
//! Two layers: [`ProviderError`] at the model-call boundary and
//! [`ClassifyError`] at the orchestration boundary. Callers classify
//! throttling via [`ProviderError::is_rate_limit`] instead of string
//! matching at every call site.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Failure of a single model call.
///
/// Providers that surface a structured throttle signal should construct
/// `Throttled` directly; for providers that only hand back text, the
/// admission controller falls back to [`rate_limit_text`] on the other
/// variants.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The backend rejected the call for exceeding its rate limit.
    #[error("throttled by backend: {0}")]
    Throttled(String),

    /// The call failed before any content was produced.
    #[error("model call failed: {0}")]
    Call(String),

    /// The fragment stream terminated with an error mid-response.
    #[error("response stream interrupted: {0}")]
    Stream(String),
}

impl ProviderError {
    /// Whether this failure should drive a multiplicative concurrency
    /// decrease.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::Throttled(_) => true,
            Self::Call(msg) | Self::Stream(msg) => rate_limit_text(msg),
        }
    }
}

/// Textual throttle heuristic for providers without a structured signal.
///
/// Deliberately broad and case-insensitive; the exact patterns are not
/// normative and live in this one function so they can be revised without
/// touching the admission controller.
pub fn rate_limit_text(message: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b429\b|rate.?limit|too many requests|quota|throttl")
            .expect("throttle pattern is a valid regex")
    });
    re.is_match(message)
}

/// Failure of a classification request.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The model selector could not produce a candidate list.
    #[error("model selection failed: {0}")]
    Selection(String),

    /// Every candidate in a fallback chain failed.
    #[error("all {attempts} candidate models exhausted; last error: {last_error}")]
    FallbackExhausted {
        attempts: usize,
        last_error: ProviderError,
    },

    /// A judge failed after its fallback chain was exhausted.
    #[error("judge {judge_index} failed: {source}")]
    Judge {
        judge_index: usize,
        #[source]
        source: Box<ClassifyError>,
    },

    /// The conversation contains no user or assistant turns.
    #[error("conversation has no user or assistant turns")]
    EmptyConversation,

    /// A tunable was set to a value that violates an invariant.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
