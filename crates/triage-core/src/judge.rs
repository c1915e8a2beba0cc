//! One LLM-backed judge: fixed prompt in, structured verdict out.

use std::sync::Arc;

use tracing::debug;

use crate::config::JudgeConfig;
use crate::conversation::{serialize_conversation, ConversationTurn};
use crate::error::ClassifyError;
use crate::fallback::{ChainOutcome, FallbackChain};
use crate::parser::parse_judge_response;
use crate::provider::{ChatMessage, ChatRequest};
use crate::verdict::JudgeVerdict;

/// Default instruction prompt. Outer layers may substitute their own
/// wording as long as the tagged response format is preserved, since the
/// parser keys on the tags.
pub const DEFAULT_JUDGE_PROMPT: &str = "\
You assess conversations for mental-health risk. Respond using exactly these tags:\n\
<language>two-letter code</language>\n\
<locale>language-COUNTRY</locale>\n\
<reflection>brief reasoning</reflection>\n\
<classification>NONE | LOW | MEDIUM | HIGH | CRITICAL</classification>\n\
<risk_types>name: confidence, one per line</risk_types>";

/// A judge's output plus the call metadata needed for audit records.
#[derive(Debug, Clone)]
pub struct JudgeAssessment {
    pub verdict: JudgeVerdict,
    /// Candidate that actually served the call.
    pub model: String,
    /// The exact request sent (model id filled in).
    pub request: ChatRequest,
}

/// Turns a conversation into one structured classification via a
/// fallback-chain-wrapped provider. Stateless per call.
pub struct Judge {
    chain: FallbackChain,
    prompt: Arc<str>,
    config: JudgeConfig,
}

impl Judge {
    pub fn new(chain: FallbackChain, prompt: Arc<str>, config: JudgeConfig) -> Self {
        Self {
            chain,
            prompt,
            config,
        }
    }

    /// Build the request template for `turns`. Deterministic: identical
    /// conversations produce identical templates.
    fn request_template(&self, turns: &[ConversationTurn]) -> ChatRequest {
        ChatRequest {
            // Filled in per candidate by the chain.
            model: String::new(),
            messages: vec![
                ChatMessage::system(self.prompt.as_ref()),
                ChatMessage::user(serialize_conversation(turns)),
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    /// Classify `turns`. Parse failures degrade to the cautious default;
    /// only chain exhaustion surfaces as an error.
    pub async fn assess(
        &self,
        turns: &[ConversationTurn],
    ) -> Result<JudgeAssessment, ClassifyError> {
        let template = self.request_template(turns);
        let ChainOutcome {
            model,
            text,
            attempts,
        } = self.chain.call(&template).await?;
        debug!(model = %model, attempts, chars = text.len(), "judge response received");
        let verdict = parse_judge_response(&text);
        let request = ChatRequest {
            model: model.clone(),
            ..template
        };
        Ok(JudgeAssessment {
            verdict,
            model,
            request,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::error::ProviderError;
    use crate::pool::PoolRegistry;
    use crate::provider::{FragmentStream, Provider};
    use crate::verdict::RiskLevel;
    use async_trait::async_trait;
    use futures::stream;
    use futures::StreamExt;

    /// Replies with the same canned text for every model.
    struct CannedProvider(String);

    #[async_trait]
    impl Provider for CannedProvider {
        async fn call(&self, _request: ChatRequest) -> Result<FragmentStream, ProviderError> {
            // Split the reply into fragments to exercise accumulation.
            let mid = self.0.len() / 2;
            let fragments = vec![
                Ok(self.0[..mid].to_string()),
                Ok(self.0[mid..].to_string()),
            ];
            Ok(stream::iter(fragments).boxed())
        }
    }

    fn judge_over(provider: CannedProvider) -> Judge {
        let pools = Arc::new(PoolRegistry::new(PoolConfig::default()));
        let chain = FallbackChain::new(Arc::new(provider), pools, vec!["m".into()]);
        Judge::new(chain, Arc::from(DEFAULT_JUDGE_PROMPT), JudgeConfig::default())
    }

    #[tokio::test]
    async fn assess_parses_streamed_response() {
        let judge = judge_over(CannedProvider(
            "<reflection>calm chat</reflection><classification>NONE</classification>".into(),
        ));
        let assessment = judge
            .assess(&[ConversationTurn::user("hello there")])
            .await
            .unwrap();
        assert_eq!(assessment.verdict.level, RiskLevel::None);
        assert_eq!(assessment.verdict.explanation, "calm chat");
        assert_eq!(assessment.model, "m");
        assert_eq!(assessment.request.model, "m");
    }

    #[tokio::test]
    async fn template_is_deterministic() {
        let judge = judge_over(CannedProvider("x".into()));
        let turns = vec![
            ConversationTurn::user("hi"),
            ConversationTurn::assistant("hello"),
        ];
        let a = judge.request_template(&turns);
        let b = judge.request_template(&turns);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
        assert!((a.temperature - 0.1).abs() < f64::EPSILON);
        assert_eq!(a.max_tokens, 1024);
    }

    #[tokio::test]
    async fn unparseable_response_degrades_not_errors() {
        let judge = judge_over(CannedProvider("I refuse to use tags today.".into()));
        let assessment = judge
            .assess(&[ConversationTurn::user("hey")])
            .await
            .unwrap();
        assert_eq!(assessment.verdict.level, RiskLevel::Medium);
        assert!(assessment.verdict.confidence <= 0.5);
    }
}
