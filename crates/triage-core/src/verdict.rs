//! Verdict types: what a judge produces, and what the classifier returns.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::ChatRequest;

/// Ordinal risk severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Fixed ordinal score used by the consensus math.
    pub fn score(self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Low => 0.25,
            Self::Medium => 0.5,
            Self::High => 0.75,
            Self::Critical => 1.0,
        }
    }

    /// Map a mean score back to a level.
    pub fn from_score(score: f64) -> Self {
        if score < 0.15 {
            Self::None
        } else if score < 0.4 {
            Self::Low
        } else if score < 0.65 {
            Self::Medium
        } else if score < 0.85 {
            Self::High
        } else {
            Self::Critical
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One judge's structured classification. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub level: RiskLevel,
    /// Confidence in `level`, 0.0–1.0.
    pub confidence: f64,
    /// Free-text reflection from the judge (or a fixed default).
    pub explanation: String,
    /// Detected two-letter language code, when reported.
    pub language: Option<String>,
    /// Detected `ll-CC` locale, when reported.
    pub locale: Option<String>,
    /// Finer-grained risk indicators, unique by name, confidence 0.0–1.0.
    pub risk_types: BTreeMap<String, f64>,
}

/// Audit record of the exact request one judge sent. Attached only in
/// debug mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeCallRecord {
    pub judge_index: usize,
    /// The candidate that actually served the call.
    pub model: String,
    pub request: ChatRequest,
    pub completed_at: DateTime<Utc>,
}

/// The classifier's answer: a verdict plus consensus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusVerdict {
    pub level: RiskLevel,
    pub confidence: f64,
    pub explanation: String,
    pub language: Option<String>,
    pub locale: Option<String>,
    pub risk_types: BTreeMap<String, f64>,
    /// How closely the judges' scores clustered, 0.0–1.0. Present only
    /// when more than one judge ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement: Option<f64>,
    /// Per-judge audit records, debug mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<Vec<JudgeCallRecord>>,
}

impl ConsensusVerdict {
    /// Lift a single judge's verdict unchanged; no agreement is reported
    /// because only one judge ran.
    pub fn from_single(verdict: JudgeVerdict) -> Self {
        Self {
            level: verdict.level,
            confidence: verdict.confidence,
            explanation: verdict.explanation,
            language: verdict.language,
            locale: verdict.locale,
            risk_types: verdict.risk_types,
            agreement: None,
            debug: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(RiskLevel::None < RiskLevel::Low);
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn score_round_trips_through_thresholds() {
        for level in [
            RiskLevel::None,
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::Critical,
        ] {
            assert_eq!(RiskLevel::from_score(level.score()), level);
        }
    }

    #[test]
    fn threshold_edges() {
        assert_eq!(RiskLevel::from_score(0.149), RiskLevel::None);
        assert_eq!(RiskLevel::from_score(0.15), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.399), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.4), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.649), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.65), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.85), RiskLevel::Critical);
    }

    #[test]
    fn serde_uses_lowercase_levels() {
        let json = serde_json::to_string(&RiskLevel::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let back: RiskLevel = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(back, RiskLevel::Medium);
    }

    #[test]
    fn optional_fields_skipped_when_absent() {
        let verdict = ConsensusVerdict::from_single(JudgeVerdict {
            level: RiskLevel::Low,
            confidence: 0.85,
            explanation: "calm conversation".into(),
            language: Some("en".into()),
            locale: None,
            risk_types: BTreeMap::new(),
        });
        let json = serde_json::to_string(&verdict).unwrap();
        assert!(!json.contains("agreement"));
        assert!(!json.contains("debug"));
    }
}
