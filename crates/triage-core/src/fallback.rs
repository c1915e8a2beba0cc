//! Ordered fallback across candidate models.
//!
//! A chain wraps one provider and an ordered candidate list. Each attempt
//! is routed through that candidate's admission pool, and the fragment
//! stream is drained *inside* the admitted slot so the concurrency bound
//! covers the full streaming duration. A failure at any point of an
//! attempt, including mid-stream, advances to the next candidate; the
//! chain itself never re-tries a candidate.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ClassifyError, ProviderError};
use crate::pool::PoolRegistry;
use crate::provider::{collect_fragments, ChatRequest, Provider};

/// A successful chain call: which candidate served it and what it said.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub model: String,
    pub text: String,
    /// Attempts made, including the successful one.
    pub attempts: usize,
}

/// Tries candidates in order until one succeeds.
pub struct FallbackChain {
    provider: Arc<dyn Provider>,
    pools: Arc<PoolRegistry>,
    candidates: Vec<String>,
}

impl FallbackChain {
    pub fn new(
        provider: Arc<dyn Provider>,
        pools: Arc<PoolRegistry>,
        candidates: Vec<String>,
    ) -> Self {
        Self {
            provider,
            pools,
            candidates,
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Attempt `template` against each candidate in order, returning the
    /// first success or an aggregated exhaustion error.
    pub async fn call(&self, template: &ChatRequest) -> Result<ChainOutcome, ClassifyError> {
        let mut last_error: Option<ProviderError> = None;
        for (attempt, model) in self.candidates.iter().enumerate() {
            let request = ChatRequest {
                model: model.clone(),
                ..template.clone()
            };
            let pool = self.pools.pool(model);
            let provider = Arc::clone(&self.provider);
            let outcome = pool
                .execute(move || async move {
                    let stream = provider.call(request).await?;
                    collect_fragments(stream).await
                })
                .await;
            match outcome {
                Ok(text) => {
                    if attempt > 0 {
                        warn!(
                            model = %model,
                            attempt = attempt + 1,
                            "fallback candidate served the call"
                        );
                    } else {
                        debug!(model = %model, "primary candidate served the call");
                    }
                    return Ok(ChainOutcome {
                        model: model.clone(),
                        text,
                        attempts: attempt + 1,
                    });
                }
                Err(err) => {
                    warn!(model = %model, error = %err, "candidate failed, advancing chain");
                    last_error = Some(err);
                }
            }
        }
        Err(ClassifyError::FallbackExhausted {
            attempts: self.candidates.len(),
            last_error: last_error
                .unwrap_or_else(|| ProviderError::Call("no candidate models configured".into())),
        })
    }
}
