//! Defensive parsing of free-form classifier output.
//!
//! The remote model is asked for strict JSON but is not guaranteed to
//! return it. This module is the single place where that gap is closed:
//! strip code fences, pull out the first balanced JSON object, repair
//! trailing commas, and fall back to the safe default object when
//! nothing parses. Parsing failures never cross this boundary as errors.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::verdict::AiAnalysis;

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("fence regex"));
static TRAILING_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("trailing comma regex"));

/// Remove a surrounding ``` / ```json fence, if present.
fn strip_code_fences(text: &str) -> &str {
    match FENCE_RE.captures(text) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(text),
        None => text.trim(),
    }
}

/// Extract the first balanced `{...}` object, ignoring braces inside
/// string literals.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// `{"a": 1,}` and `[1, 2,]` are common model mistakes.
fn strip_trailing_commas(json: &str) -> String {
    TRAILING_COMMA_RE.replace_all(json, "$1").into_owned()
}

/// Parse whatever the classifier returned into an `AiAnalysis`.
///
/// Never fails: every unusable input maps to the safe default
/// (`is_spam=false, confidence=0, threat_type="legitimate",
/// recommended_action="allow"`), and missing fields inside an otherwise
/// valid object are filled with the same defaults via serde.
pub fn parse_classifier_output(raw: &str) -> AiAnalysis {
    let unfenced = strip_code_fences(raw);
    let Some(object) = extract_json_object(unfenced) else {
        tracing::warn!(raw = %truncate(raw, 200), "classifier output contained no JSON object");
        return AiAnalysis::default();
    };
    let repaired = strip_trailing_commas(object);

    match serde_json::from_str::<AiAnalysis>(&repaired) {
        Ok(mut analysis) => {
            analysis.confidence = analysis.confidence.min(100);
            analysis
        }
        Err(e) => {
            tracing::warn!(error = %e, raw = %truncate(raw, 200), "classifier JSON did not parse");
            AiAnalysis::default()
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::RecommendedAction;

    const VALID: &str = r#"{"is_spam": true, "confidence": 92,
        "spam_indicators": ["links", "promotional language"],
        "threat_type": "promotional",
        "reasoning": "multiple pharma keywords and link farm",
        "recommended_action": "block"}"#;

    #[test]
    fn parses_plain_json() {
        let a = parse_classifier_output(VALID);
        assert!(a.is_spam);
        assert_eq!(a.confidence, 92);
        assert_eq!(a.threat_type, "promotional");
        assert_eq!(a.recommended_action, RecommendedAction::Block);
    }

    #[test]
    fn parses_fenced_json() {
        let fenced = format!("```json\n{VALID}\n```");
        let a = parse_classifier_output(&fenced);
        assert!(a.is_spam);
        assert_eq!(a.confidence, 92);

        let bare_fence = format!("```\n{VALID}\n```");
        assert!(parse_classifier_output(&bare_fence).is_spam);
    }

    #[test]
    fn parses_json_embedded_in_prose() {
        let chatty = format!("Sure! Here is my analysis:\n\n{VALID}\n\nLet me know if...");
        let a = parse_classifier_output(&chatty);
        assert!(a.is_spam);
        assert_eq!(a.spam_indicators.len(), 2);
    }

    #[test]
    fn repairs_trailing_commas() {
        let sloppy = r#"{"is_spam": true, "confidence": 88, "spam_indicators": ["a", "b",],}"#;
        let a = parse_classifier_output(sloppy);
        assert!(a.is_spam);
        assert_eq!(a.confidence, 88);
        assert_eq!(a.spam_indicators, vec!["a", "b"]);
    }

    #[test]
    fn missing_fields_get_safe_defaults() {
        let partial = r#"{"is_spam": true}"#;
        let a = parse_classifier_output(partial);
        assert!(a.is_spam);
        assert_eq!(a.confidence, 0);
        assert_eq!(a.threat_type, "legitimate");
        assert_eq!(a.recommended_action, RecommendedAction::Allow);
    }

    #[test]
    fn garbage_yields_the_safe_default() {
        for garbage in [
            "",
            "I could not analyze this content.",
            "{not json at all",
            "{\"is_spam\": maybe}",
            "]]]}}}",
        ] {
            let a = parse_classifier_output(garbage);
            assert!(!a.is_spam, "input {garbage:?} must default to clean");
            assert_eq!(a.confidence, 0);
        }
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_extraction() {
        let tricky = r#"{"is_spam": false, "reasoning": "looks like {fine} text"}"#;
        let a = parse_classifier_output(tricky);
        assert!(!a.is_spam);
        assert_eq!(a.reasoning, "looks like {fine} text");
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        // u8 deserialization already rejects >255; 100 < x <= 255 clamps.
        let hot = r#"{"is_spam": true, "confidence": 250}"#;
        assert_eq!(parse_classifier_output(hot).confidence, 100);
    }
}
