//! Tolerant extraction of a structured verdict from raw judge output.
//!
//! LLMs drift: tags change case, pick up stray whitespace, drop sections.
//! The extractor here accepts all of that. The one failure that matters,
//! a missing or unrecognized classification token, degrades to a cautious
//! default (medium risk, low confidence) instead of erroring; silently
//! dropping a safety classification is worse than a conservative guess.

use std::collections::BTreeMap;

use regex::Regex;
use tracing::debug;

use crate::verdict::{JudgeVerdict, RiskLevel};

/// Explanation used when the response carries no `<reflection>` block.
pub const DEFAULT_EXPLANATION: &str = "No reflection provided by the model.";

/// Explanation used when the classification token cannot be parsed.
pub const UNPARSED_EXPLANATION: &str =
    "Model response could not be parsed; defaulting to a cautious classification.";

/// Confidence assigned to the cautious default.
pub const UNPARSED_CONFIDENCE: f64 = 0.3;

/// Extract the inner text of `<tag>…</tag>`, tolerating case differences
/// and whitespace inside the angle brackets.
pub fn extract_tag(text: &str, tag: &str) -> Option<String> {
    // `tag` is always a fixed ASCII identifier, so the pattern is valid.
    let re = Regex::new(&format!(
        r"(?is)<\s*{tag}\s*>\s*(.*?)\s*<\s*/\s*{tag}\s*>"
    ))
    .ok()?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Normalize a reported language to a lowercase two-letter code.
pub fn normalize_language(raw: &str) -> Option<String> {
    let trimmed = raw.trim().to_lowercase();
    let mapped = match trimmed.as_str() {
        "english" => "en",
        "spanish" | "español" | "espanol" => "es",
        "french" | "français" | "francais" => "fr",
        "german" | "deutsch" => "de",
        "portuguese" | "português" | "portugues" => "pt",
        "italian" | "italiano" => "it",
        "dutch" | "nederlands" => "nl",
        "russian" => "ru",
        "chinese" | "mandarin" => "zh",
        "japanese" => "ja",
        "korean" => "ko",
        "arabic" => "ar",
        "hindi" => "hi",
        other => {
            if other.len() == 2 && other.chars().all(|c| c.is_ascii_lowercase()) {
                other
            } else {
                return None;
            }
        }
    };
    Some(mapped.to_string())
}

/// Normalize a reported locale to `ll-CC`. Accepts `_`, `-`, or space as
/// the separator and any casing. A bare language is not a locale.
pub fn normalize_locale(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let parts: Vec<&str> = trimmed
        .split(['-', '_', ' '])
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != 2 {
        return None;
    }
    let language = normalize_language(parts[0])?;
    let country = parts[1];
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(format!("{language}-{}", country.to_uppercase()))
}

/// Canonical classification tokens and their (level, base confidence).
fn classification_table(token: &str) -> Option<(RiskLevel, f64)> {
    let canonical = match token {
        "SAFE" => "NONE",
        "MODERATE" => "MEDIUM",
        "SEVERE" | "IMMINENT" => "CRITICAL",
        other => other,
    };
    match canonical {
        "NONE" => Some((RiskLevel::None, 0.90)),
        "LOW" => Some((RiskLevel::Low, 0.85)),
        "MEDIUM" => Some((RiskLevel::Medium, 0.80)),
        "HIGH" => Some((RiskLevel::High, 0.85)),
        "CRITICAL" => Some((RiskLevel::Critical, 0.90)),
        _ => None,
    }
}

/// Parse `name: confidence` entries from a `<risk_types>` block.
///
/// Entries are separated by newlines, commas, or semicolons. Names are
/// normalized to lowercase snake case; confidences are clamped to [0, 1];
/// malformed entries are skipped; duplicates keep the maximum confidence.
fn parse_risk_types(block: &str) -> BTreeMap<String, f64> {
    let mut types = BTreeMap::new();
    for entry in block.split(['\n', ',', ';']) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((name, confidence)) = entry.split_once(':') else {
            debug!(entry, "skipping risk-type entry without separator");
            continue;
        };
        let name = name
            .trim()
            .to_lowercase()
            .replace([' ', '-'], "_");
        if name.is_empty() {
            continue;
        }
        let Ok(confidence) = confidence.trim().parse::<f64>() else {
            debug!(entry, "skipping risk-type entry with non-numeric confidence");
            continue;
        };
        let confidence = confidence.clamp(0.0, 1.0);
        types
            .entry(name)
            .and_modify(|existing: &mut f64| *existing = existing.max(confidence))
            .or_insert(confidence);
    }
    types
}

/// Turn accumulated judge output into a verdict. Never fails.
pub fn parse_judge_response(text: &str) -> JudgeVerdict {
    let language = extract_tag(text, "language").and_then(|raw| normalize_language(&raw));
    let locale = extract_tag(text, "locale").and_then(|raw| normalize_locale(&raw));
    let reflection = extract_tag(text, "reflection")
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_EXPLANATION.to_string());
    let risk_types = extract_tag(text, "risk_types")
        .map(|block| parse_risk_types(&block))
        .unwrap_or_default();

    let token = extract_tag(text, "classification").map(|raw| raw.trim().to_uppercase());
    match token.as_deref().and_then(classification_table) {
        Some((level, confidence)) => JudgeVerdict {
            level,
            confidence,
            explanation: reflection,
            language,
            locale,
            risk_types,
        },
        None => {
            debug!(
                token = token.as_deref().unwrap_or("<missing>"),
                "unrecognized classification token, degrading to cautious default"
            );
            JudgeVerdict {
                level: RiskLevel::Medium,
                confidence: UNPARSED_CONFIDENCE,
                explanation: UNPARSED_EXPLANATION.to_string(),
                language,
                locale,
                risk_types,
            }
        }
    }
}
