//! Resilience and arbitration core for conversational risk triage.
//!
//! This library sits between "I need a risk classification" and "an LLM
//! actually answered". It owns the two hard problems in that gap:
//!
//! - **Admission control**: each backend model gets an [`pool::AdaptiveModelPool`]
//!   that bounds concurrent in-flight calls and tunes the bound with
//!   AIMD-style congestion control (grow by one after a success streak,
//!   halve on a throttle signal, cooldown between decreases).
//! - **Arbitration**: a [`classifier::RiskClassifier`] selects candidate
//!   models, runs one or three independent [`judge::Judge`]s behind
//!   [`fallback::FallbackChain`]s, and folds their verdicts into a single
//!   [`verdict::ConsensusVerdict`] with a quantified agreement score.
//!
//! # Pipeline
//!
//! ```text
//! classify_risk(conversation)
//!   → ModelSelector.select_models     — candidate list [primary, fallbacks…]
//!   → Judge × {1, 3}                  — rotated candidate orderings
//!       → FallbackChain.call          — advance on candidate failure
//!           → AdaptiveModelPool.execute  — FIFO admission, AIMD tuning
//!               → Provider.call          — streamed fragments
//!   → fold_verdicts                   — mean score, agreement = 1 − cv
//! ```
//!
//! Network I/O, prompt wording, model catalogs, and persistence live outside
//! this crate; they are consumed through the [`provider::Provider`] and
//! [`selector::ModelSelector`] traits.

pub mod classifier;
pub mod config;
pub mod consensus;
pub mod conversation;
pub mod error;
pub mod fallback;
pub mod judge;
pub mod parser;
pub mod pool;
pub mod provider;
pub mod selector;
pub mod verdict;

pub use classifier::{ClassifierConfig, JudgePolicy, RiskClassifier};
pub use config::{JudgeConfig, PoolConfig};
pub use conversation::{ConversationTurn, TurnRole};
pub use error::{ClassifyError, ProviderError};
pub use fallback::FallbackChain;
pub use judge::Judge;
pub use pool::{AdaptiveModelPool, PoolRegistry, PoolSnapshot};
pub use provider::{ChatMessage, ChatRequest, ChatRole, FragmentStream, Provider};
pub use selector::{ModelPlan, ModelSelector, SelectionQuery};
pub use verdict::{ConsensusVerdict, JudgeCallRecord, JudgeVerdict, RiskLevel};
