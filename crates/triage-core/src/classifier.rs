//! The classification orchestrator.
//!
//! `RiskClassifier` glues the seams together: ask the model selector for a
//! candidate list, build one or three judges over rotations of that list,
//! run them concurrently, and fold their verdicts. Retry and backoff live
//! entirely in the pool and chain layers; the classifier never retries.
//!
//! ## Candidate rotations (ensemble mode)
//!
//! Three judges share the vetted candidate pool but lead with different
//! models, trading some cost for model diversity:
//!
//! ```text
//! judge 0: [primary, fb0, fb1, …]
//! judge 1: [fb0, primary, fb1, …]    — primary demoted into fb0's slot
//! judge 2: [fb1, fb0, primary, …]    — primary demoted into fb1's slot
//! ```
//!
//! With fewer than two fallbacks the missing rotations repeat judge 0's
//! ordering.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info};

use crate::config::JudgeConfig;
use crate::consensus::fold_verdicts;
use crate::conversation::{has_assessable_turns, serialize_conversation, ConversationTurn};
use crate::error::ClassifyError;
use crate::fallback::FallbackChain;
use crate::judge::{Judge, JudgeAssessment, DEFAULT_JUDGE_PROMPT};
use crate::pool::PoolRegistry;
use crate::provider::Provider;
use crate::selector::{ModelSelector, SelectionQuery};
use crate::verdict::{ConsensusVerdict, JudgeCallRecord};

/// How many judges a classification runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgePolicy {
    /// One judge over `[primary, fallbacks…]`. The default.
    Single,
    /// Exactly three judges over candidate rotations.
    Ensemble,
}

/// Classifier settings.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub policy: JudgePolicy,
    pub judge: JudgeConfig,
    /// Instruction prompt shared by every judge.
    pub prompt: Arc<str>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            policy: JudgePolicy::Single,
            judge: JudgeConfig::default(),
            prompt: Arc::from(DEFAULT_JUDGE_PROMPT),
        }
    }
}

impl ClassifierConfig {
    pub fn policy(mut self, policy: JudgePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn judge(mut self, judge: JudgeConfig) -> Self {
        self.judge = judge;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<Arc<str>>) -> Self {
        self.prompt = prompt.into();
        self
    }
}

/// Orchestrates model selection, judge fan-out, and consensus folding.
pub struct RiskClassifier {
    provider: Arc<dyn Provider>,
    selector: Arc<dyn ModelSelector>,
    pools: Arc<PoolRegistry>,
    config: ClassifierConfig,
}

impl RiskClassifier {
    pub fn new(
        provider: Arc<dyn Provider>,
        selector: Arc<dyn ModelSelector>,
        pools: Arc<PoolRegistry>,
        config: ClassifierConfig,
    ) -> Self {
        Self {
            provider,
            selector,
            pools,
            config,
        }
    }

    /// Admission-control snapshots for every model touched so far.
    pub fn pool_snapshots(&self) -> Vec<crate::pool::PoolSnapshot> {
        self.pools.snapshots()
    }

    /// Classify a conversation.
    ///
    /// With `include_debug` the result carries, per judge, the exact
    /// request that was sent.
    pub async fn classify_risk(
        &self,
        turns: &[ConversationTurn],
        include_debug: bool,
    ) -> Result<ConsensusVerdict, ClassifyError> {
        if !has_assessable_turns(turns) {
            return Err(ClassifyError::EmptyConversation);
        }

        let query = SelectionQuery {
            input_size_estimate: serialize_conversation(turns).len(),
            required_capability: self.config.judge.required_capability.clone(),
        };
        let plan = self.selector.select_models(&query).await?;
        info!(
            primary = %plan.primary,
            fallbacks = plan.fallbacks.len(),
            reason = %plan.reason,
            policy = ?self.config.policy,
            "candidate models selected"
        );
        let candidates = plan.candidates();

        let assessments = match self.config.policy {
            JudgePolicy::Single => {
                let judge = self.build_judge(candidates);
                let assessment = judge.assess(turns).await.map_err(|err| {
                    ClassifyError::Judge {
                        judge_index: 0,
                        source: Box::new(err),
                    }
                })?;
                vec![assessment]
            }
            JudgePolicy::Ensemble => {
                let judge_futures = rotations(&candidates)
                    .into_iter()
                    .enumerate()
                    .map(|(index, order)| {
                        let judge = self.build_judge(order);
                        async move {
                            judge.assess(turns).await.map_err(|err| {
                                ClassifyError::Judge {
                                    judge_index: index,
                                    source: Box::new(err),
                                }
                            })
                        }
                    });
                // Fan-out / fan-in with no early exit: every judge runs to
                // completion even when a sibling fails, so no in-flight
                // call is ever cancelled mid-stream. One exhausted judge
                // still fails the whole call; there is no partial
                // consensus.
                let mut assessments = Vec::with_capacity(3);
                let mut first_error = None;
                for outcome in join_all(judge_futures).await {
                    match outcome {
                        Ok(assessment) => assessments.push(assessment),
                        Err(err) => {
                            first_error.get_or_insert(err);
                        }
                    }
                }
                if let Some(err) = first_error {
                    return Err(err);
                }
                assessments
            }
        };

        let verdicts: Vec<_> = assessments.iter().map(|a| a.verdict.clone()).collect();
        let mut folded = fold_verdicts(&verdicts);
        debug!(
            level = %folded.level,
            confidence = folded.confidence,
            agreement = ?folded.agreement,
            judges = verdicts.len(),
            "classification complete"
        );
        if include_debug {
            folded.debug = Some(call_records(&assessments));
        }
        Ok(folded)
    }

    fn build_judge(&self, candidates: Vec<String>) -> Judge {
        let chain = FallbackChain::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.pools),
            candidates,
        );
        Judge::new(chain, Arc::clone(&self.config.prompt), self.config.judge.clone())
    }
}

/// The three candidate orderings for ensemble mode.
fn rotations(candidates: &[String]) -> Vec<Vec<String>> {
    let mut orders = Vec::with_capacity(3);
    orders.push(candidates.to_vec());
    for promote in 1..3 {
        if promote < candidates.len() {
            let mut order = candidates.to_vec();
            order.swap(0, promote);
            orders.push(order);
        } else {
            orders.push(candidates.to_vec());
        }
    }
    orders
}

fn call_records(assessments: &[JudgeAssessment]) -> Vec<JudgeCallRecord> {
    assessments
        .iter()
        .enumerate()
        .map(|(judge_index, a)| JudgeCallRecord {
            judge_index,
            model: a.model.clone(),
            request: a.request.clone(),
            completed_at: Utc::now(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rotations_promote_each_fallback() {
        let orders = rotations(&ids(&["p", "f0", "f1", "f2"]));
        assert_eq!(orders[0], ids(&["p", "f0", "f1", "f2"]));
        assert_eq!(orders[1], ids(&["f0", "p", "f1", "f2"]));
        assert_eq!(orders[2], ids(&["f1", "f0", "p", "f2"]));
    }

    #[test]
    fn rotations_with_one_fallback_repeat_first_ordering() {
        let orders = rotations(&ids(&["p", "f0"]));
        assert_eq!(orders[0], ids(&["p", "f0"]));
        assert_eq!(orders[1], ids(&["f0", "p"]));
        assert_eq!(orders[2], ids(&["p", "f0"]));
    }

    #[test]
    fn rotations_with_no_fallbacks_are_identical() {
        let orders = rotations(&ids(&["p"]));
        assert_eq!(orders.len(), 3);
        for order in orders {
            assert_eq!(order, ids(&["p"]));
        }
    }
}
