//! Response recovery: pull a JSON value out of free-form model text.
//!
//! Even when told to "return ONLY valid JSON", models routinely answer with
//! a preamble, a ` ```json ` fence, or a closing remark. Recovery is an
//! ordered chain of independent tiers; each one proposes a candidate span
//! and the first candidate that parses wins:
//!
//! 1. [`RecoveryTier::ArraySpan`]  — first `[` to last `]`
//! 2. [`RecoveryTier::ObjectSpan`] — first `{` to last `}`
//! 3. [`RecoveryTier::RawText`]    — the whole text, verbatim
//!
//! Both span tiers are greedy, so nested brackets and braces stay inside the
//! candidate. An array span that sits inside a parseable object span (an
//! object's `items` list, say) is not proposed: it is part of the object,
//! not the answer. An object span that opens inside an unclosed `[` is not
//! proposed either: it is one element of a truncated array.
//!
//! Everything here is a pure function of the input text.

use crate::error::ReceiptError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

static RE_ARRAY_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[.*\]").unwrap());

static RE_OBJECT_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// One step of the recovery chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryTier {
    ArraySpan,
    ObjectSpan,
    RawText,
}

impl RecoveryTier {
    /// Tiers in the order they are attempted.
    pub const CHAIN: [RecoveryTier; 3] = [
        RecoveryTier::ArraySpan,
        RecoveryTier::ObjectSpan,
        RecoveryTier::RawText,
    ];

    /// The span of `text` this tier would try to parse, if any.
    pub fn candidate(self, text: &str) -> Option<&str> {
        match self {
            RecoveryTier::ArraySpan => {
                let array = RE_ARRAY_SPAN.find(text)?;
                if let Some(object) = RE_OBJECT_SPAN.find(text) {
                    let encloses = object.start() < array.start() && object.end() >= array.end();
                    if encloses && serde_json::from_str::<Value>(object.as_str()).is_ok() {
                        return None;
                    }
                }
                Some(array.as_str())
            }
            RecoveryTier::ObjectSpan => {
                let object = RE_OBJECT_SPAN.find(text)?;
                if bracket_depth(&text[..object.start()]) > 0 {
                    return None;
                }
                Some(object.as_str())
            }
            RecoveryTier::RawText => Some(text.trim()),
        }
    }
}

/// Count of `[` left open at the end of `prefix`.
fn bracket_depth(prefix: &str) -> usize {
    prefix.chars().fold(0usize, |depth, c| match c {
        '[' => depth + 1,
        ']' => depth.saturating_sub(1),
        _ => depth,
    })
}

/// A recovered value and the tier that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub value: Value,
    pub tier: RecoveryTier,
}

/// Run the recovery chain over `raw`.
///
/// # Errors
/// [`ReceiptError::Parse`] carrying `raw` when no tier yields valid JSON.
pub fn recover(raw: &str) -> Result<Recovered, ReceiptError> {
    let mut last_error: Option<String> = None;

    for tier in RecoveryTier::CHAIN {
        let Some(candidate) = tier.candidate(raw) else {
            continue;
        };
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => {
                debug!("Recovered JSON via {:?} ({} chars)", tier, candidate.len());
                return Ok(Recovered { value, tier });
            }
            Err(e) => {
                warn!("{:?} candidate did not parse: {}", tier, e);
                last_error = Some(e.to_string());
            }
        }
    }

    Err(ReceiptError::Parse {
        raw_text: raw.to_string(),
        detail: last_error.unwrap_or_else(|| "no JSON found in response".to_string()),
    })
}

/// [`recover`], keeping only the value.
pub fn recover_json(raw: &str) -> Result<Value, ReceiptError> {
    recover(raw).map(|r| r.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pure_json_object_matches_direct_parse() {
        let raw = r#"{"merchant_name": "Bazar", "total": 12.5}"#;
        let direct: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(recover_json(raw).unwrap(), direct);
    }

    #[test]
    fn pure_json_array_matches_direct_parse() {
        let raw = r#"[{"item_name": "Milk", "line_total": 1.8}, {"item_name": "Bread", "line_total": 0.6}]"#;
        let direct: Value = serde_json::from_str(raw).unwrap();
        let r = recover(raw).unwrap();
        assert_eq!(r.value, direct);
        assert_eq!(r.tier, RecoveryTier::ArraySpan);
    }

    #[test]
    fn fenced_object_inside_prose() {
        let raw = "Here is the result:\n```json\n{\"total\": 5.00}\n```\nThanks";
        let r = recover(raw).unwrap();
        assert_eq!(r.value, json!({"total": 5.00}));
        assert_eq!(r.tier, RecoveryTier::ObjectSpan);
    }

    #[test]
    fn fenced_array_inside_prose() {
        let raw = "Sure!\n```json\n[{\"item_name\": \"Tea\"}]\n```";
        assert_eq!(recover_json(raw).unwrap(), json!([{"item_name": "Tea"}]));
    }

    #[test]
    fn nested_items_array_does_not_shadow_object() {
        let raw = r#"```json
{"merchant_name": "Araz", "items": [{"name": "Eggs", "quantity": 1, "price": "2.40"}], "total": 2.4}
```"#;
        let r = recover(raw).unwrap();
        assert_eq!(r.tier, RecoveryTier::ObjectSpan);
        assert_eq!(r.value["merchant_name"], "Araz");
        assert_eq!(r.value["items"][0]["name"], "Eggs");
    }

    #[test]
    fn unparseable_array_span_falls_through_to_object() {
        let raw = "Receipt [scanned] follows: {\"total\": 3}";
        let r = recover(raw).unwrap();
        assert_eq!(r.tier, RecoveryTier::ObjectSpan);
        assert_eq!(r.value, json!({"total": 3}));
    }

    #[test]
    fn raw_tier_handles_bare_scalars() {
        let r = recover("  42 \n").unwrap();
        assert_eq!(r.tier, RecoveryTier::RawText);
        assert_eq!(r.value, json!(42));
    }

    #[test]
    fn garbage_is_a_parse_error_with_raw_text() {
        let raw = "I could not read this receipt, the image is blurry.";
        let err = recover_json(raw).unwrap_err();
        assert_eq!(err.raw_text(), Some(raw));
        assert!(matches!(err, ReceiptError::Parse { .. }));
    }

    #[test]
    fn truncated_json_is_a_parse_error() {
        let raw = r#"[{"item_name": "Milk", "line_total": 1.8}, {"item_na"#;
        let err = recover_json(raw).unwrap_err();
        assert_eq!(err.raw_text(), Some(raw));
    }

    #[test]
    fn truncated_array_does_not_yield_its_first_element() {
        let raw = "```json\n[\n  {\"item_name\": \"Milk\"},\n  {\"item_name\": \"Bread\", \"quantity\": [1]}, {\"item";
        assert_eq!(RecoveryTier::ObjectSpan.candidate(raw), None);
        let err = recover_json(raw).unwrap_err();
        assert!(matches!(err, ReceiptError::Parse { .. }));
        assert_eq!(err.raw_text(), Some(raw));
    }

    #[test]
    fn prose_braces_around_array_do_not_hide_it() {
        let raw = "Fields {as requested}:\n[{\"item_name\": \"Tea\"}]\nNote: see {footer}";
        let r = recover(raw).unwrap();
        assert_eq!(r.tier, RecoveryTier::ArraySpan);
        assert_eq!(r.value, json!([{"item_name": "Tea"}]));
    }

    #[test]
    fn candidates_follow_chain_order() {
        let text = "x [1] y {\"a\": 2} z";
        assert_eq!(RecoveryTier::ArraySpan.candidate(text), Some("[1]"));
        assert_eq!(RecoveryTier::ObjectSpan.candidate(text), Some("{\"a\": 2}"));
        assert_eq!(RecoveryTier::RawText.candidate("  t  "), Some("t"));
        assert_eq!(RecoveryTier::ArraySpan.candidate("no brackets"), None);
    }
}
