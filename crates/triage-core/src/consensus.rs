//! Folding independent judge verdicts into one answer.
//!
//! Each level maps to a fixed ordinal score. Agreement is derived from the
//! coefficient of variation of those scores: `agreement = 1 − stddev/mean`,
//! clamped to [0, 1]. Identical verdicts give 1.0; wide disagreement drives
//! it toward 0 and scales down the reported confidence, because a split
//! jury must not sound certain.

use std::collections::BTreeMap;

use tracing::warn;

use crate::parser::{UNPARSED_CONFIDENCE, UNPARSED_EXPLANATION};
use crate::verdict::{ConsensusVerdict, JudgeVerdict, RiskLevel};

/// Agreement below which the folded confidence is scaled down.
const CONFIDENCE_SCALE_THRESHOLD: f64 = 0.8;

/// Agreement below which a non-fatal warning is emitted.
const LOW_AGREEMENT_THRESHOLD: f64 = 0.67;

/// Fold verdicts into a consensus.
///
/// With a single verdict the fields pass through and no agreement is
/// reported. An empty slice is a caller bug; it degrades to the cautious
/// default rather than panicking.
pub fn fold_verdicts(verdicts: &[JudgeVerdict]) -> ConsensusVerdict {
    let Some(first) = verdicts.first() else {
        warn!("fold_verdicts called with no verdicts, returning cautious default");
        return ConsensusVerdict {
            level: RiskLevel::Medium,
            confidence: UNPARSED_CONFIDENCE,
            explanation: UNPARSED_EXPLANATION.to_string(),
            language: None,
            locale: None,
            risk_types: BTreeMap::new(),
            agreement: None,
            debug: None,
        };
    };
    if verdicts.len() == 1 {
        return ConsensusVerdict::from_single(first.clone());
    }

    let scores: Vec<f64> = verdicts.iter().map(|v| v.level.score()).collect();
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    let cv = if mean > 0.0 { variance.sqrt() / mean } else { 0.0 };
    let agreement = (1.0 - cv).clamp(0.0, 1.0);

    let level = RiskLevel::from_score(mean);
    let max_confidence = verdicts.iter().map(|v| v.confidence).fold(0.0, f64::max);
    let confidence = if agreement >= CONFIDENCE_SCALE_THRESHOLD {
        max_confidence
    } else {
        max_confidence * agreement
    };

    if agreement < LOW_AGREEMENT_THRESHOLD {
        warn!(
            agreement,
            levels = ?verdicts.iter().map(|v| v.level.as_str()).collect::<Vec<_>>(),
            "low consensus between judges"
        );
    }

    // Union of risk types, per-type maximum confidence.
    let mut risk_types: BTreeMap<String, f64> = BTreeMap::new();
    for verdict in verdicts {
        for (name, conf) in &verdict.risk_types {
            risk_types
                .entry(name.clone())
                .and_modify(|existing| *existing = existing.max(*conf))
                .or_insert(*conf);
        }
    }

    // Judges are expected to agree on the descriptive fields even when
    // they disagree on severity; take them from the first.
    ConsensusVerdict {
        level,
        confidence,
        explanation: first.explanation.clone(),
        language: first.language.clone(),
        locale: first.locale.clone(),
        risk_types,
        agreement: Some(agreement),
        debug: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(level: RiskLevel, confidence: f64) -> JudgeVerdict {
        JudgeVerdict {
            level,
            confidence,
            explanation: format!("{level} assessment"),
            language: Some("en".into()),
            locale: Some("en-US".into()),
            risk_types: BTreeMap::new(),
        }
    }

    #[test]
    fn identical_verdicts_agree_fully() {
        let verdicts = vec![
            verdict(RiskLevel::High, 0.85),
            verdict(RiskLevel::High, 0.85),
            verdict(RiskLevel::High, 0.85),
        ];
        let folded = fold_verdicts(&verdicts);
        assert_eq!(folded.agreement, Some(1.0));
        assert_eq!(folded.level, RiskLevel::High);
        assert!((folded.confidence - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn identical_none_verdicts_agree_fully() {
        // Mean score 0 must not divide by zero.
        let verdicts = vec![
            verdict(RiskLevel::None, 0.9),
            verdict(RiskLevel::None, 0.9),
            verdict(RiskLevel::None, 0.9),
        ];
        let folded = fold_verdicts(&verdicts);
        assert_eq!(folded.agreement, Some(1.0));
        assert_eq!(folded.level, RiskLevel::None);
    }

    #[test]
    fn disagreement_scales_confidence_down() {
        let verdicts = vec![
            verdict(RiskLevel::Low, 0.85),
            verdict(RiskLevel::Medium, 0.80),
            verdict(RiskLevel::High, 0.85),
        ];
        let folded = fold_verdicts(&verdicts);
        // Scores 0.25/0.5/0.75: mean 0.5, stddev ~0.204, cv ~0.408.
        let agreement = folded.agreement.unwrap();
        assert!((agreement - 0.5918).abs() < 0.001);
        assert_eq!(folded.level, RiskLevel::Medium);
        assert!((folded.confidence - 0.85 * agreement).abs() < 1e-9);
    }

    #[test]
    fn confidence_never_exceeds_judge_maximum() {
        let verdicts = vec![
            verdict(RiskLevel::Medium, 0.6),
            verdict(RiskLevel::Medium, 0.9),
            verdict(RiskLevel::High, 0.7),
        ];
        let folded = fold_verdicts(&verdicts);
        assert!(folded.confidence <= 0.9 + f64::EPSILON);
    }

    #[test]
    fn near_agreement_keeps_max_confidence() {
        // Scores 0.75/0.75/1.0: mean ~0.833, stddev ~0.118, cv ~0.141,
        // agreement ~0.859 ≥ 0.8 so confidence is the unscaled maximum.
        let verdicts = vec![
            verdict(RiskLevel::High, 0.85),
            verdict(RiskLevel::High, 0.85),
            verdict(RiskLevel::Critical, 0.9),
        ];
        let folded = fold_verdicts(&verdicts);
        assert!(folded.agreement.unwrap() >= 0.8);
        assert!((folded.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn risk_types_union_takes_per_type_max() {
        let mut a = verdict(RiskLevel::Medium, 0.8);
        a.risk_types.insert("x".into(), 0.6);
        let mut b = verdict(RiskLevel::Medium, 0.8);
        b.risk_types.insert("x".into(), 0.9);
        b.risk_types.insert("y".into(), 0.5);
        let folded = fold_verdicts(&[a, b]);
        assert_eq!(folded.risk_types["x"], 0.9);
        assert_eq!(folded.risk_types["y"], 0.5);
        assert_eq!(folded.risk_types.len(), 2);
    }

    #[test]
    fn descriptive_fields_come_from_first_judge() {
        let mut a = verdict(RiskLevel::Low, 0.85);
        a.explanation = "first explanation".into();
        a.language = Some("es".into());
        a.locale = Some("es-MX".into());
        let b = verdict(RiskLevel::High, 0.85);
        let folded = fold_verdicts(&[a, b]);
        assert_eq!(folded.explanation, "first explanation");
        assert_eq!(folded.language.as_deref(), Some("es"));
        assert_eq!(folded.locale.as_deref(), Some("es-MX"));
    }

    #[test]
    fn single_verdict_passes_through_without_agreement() {
        let folded = fold_verdicts(&[verdict(RiskLevel::Critical, 0.9)]);
        assert_eq!(folded.level, RiskLevel::Critical);
        assert!((folded.confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(folded.agreement, None);
    }

    #[test]
    fn empty_input_degrades_to_cautious_default() {
        let folded = fold_verdicts(&[]);
        assert_eq!(folded.level, RiskLevel::Medium);
        assert!(folded.confidence <= 0.5);
    }
}
