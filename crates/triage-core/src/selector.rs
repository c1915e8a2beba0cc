//! The model-selection seam.
//!
//! The catalog/cost selector is an external collaborator: given an input
//! size estimate and a capability tag it proposes an ordered candidate
//! list. The proposal is purely advisory; the classifier decides how the
//! candidates are rotated across judges.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClassifyError;

/// Inputs the selector may use to pick candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionQuery {
    /// Size of the serialized conversation, in bytes.
    pub input_size_estimate: usize,
    /// Capability tag the chosen models must support.
    pub required_capability: String,
}

/// An ordered candidate list: `primary` first, then fallbacks in
/// preference order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPlan {
    pub primary: String,
    pub fallbacks: Vec<String>,
    /// Human-readable selection rationale, logged but never interpreted.
    pub reason: String,
}

impl ModelPlan {
    /// The full candidate sequence `[primary, fallbacks…]`.
    pub fn candidates(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(1 + self.fallbacks.len());
        out.push(self.primary.clone());
        out.extend(self.fallbacks.iter().cloned());
        out
    }
}

/// Proposes candidate models for a classification request. Side-effect
/// free; called once per `classify_risk` invocation.
#[async_trait]
pub trait ModelSelector: Send + Sync {
    async fn select_models(&self, query: &SelectionQuery) -> Result<ModelPlan, ClassifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_keep_order() {
        let plan = ModelPlan {
            primary: "a".into(),
            fallbacks: vec!["b".into(), "c".into()],
            reason: "cheapest capable".into(),
        };
        assert_eq!(plan.candidates(), vec!["a", "b", "c"]);
    }

    #[test]
    fn candidates_without_fallbacks() {
        let plan = ModelPlan {
            primary: "solo".into(),
            fallbacks: vec![],
            reason: String::new(),
        };
        assert_eq!(plan.candidates(), vec!["solo"]);
    }
}
