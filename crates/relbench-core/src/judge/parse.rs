//! Score extraction from free-form model output.
//!
//! Models wrap their verdict in prose, code fences, or several JSON-ish
//! fragments. The parser looks for the first balanced `{...}` object that
//! decodes and carries a usable `score`, then falls back to a plain
//! `score: N` pattern.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

pub const MIN_SCORE: i64 = 0;
pub const MAX_SCORE: i64 = 3;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("valid fence regex")
    })
}

fn score_kv_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bscore\s*[:=]\s*([0-3])\b").expect("valid score regex"))
}

/// Returns `(score, reason)`. `score` is always within `[0, 3]` when present.
pub fn parse_score_and_reason(text: &str) -> (Option<u8>, Option<String>) {
    let body = strip_code_fence(text);

    for obj in BalancedObjects::new(body) {
        if let Some(score) = get_ci(&obj, "score").and_then(normalize_score) {
            let reason = get_ci(&obj, "reason").and_then(scalar_to_string);
            return (Some(score), reason);
        }
    }

    if let Some(caps) = score_kv_re().captures(text) {
        if let Some(score) = caps.get(1).and_then(|m| m.as_str().parse::<u8>().ok()) {
            return (Some(score), None);
        }
    }

    (None, None)
}

/// Removes a single enclosing ``` / ```json fence, if the whole text is fenced.
pub fn strip_code_fence(text: &str) -> &str {
    match fence_re().captures(text.trim()).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => text,
    }
}

fn get_ci<'a>(obj: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    obj.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn normalize_score(v: &Value) -> Option<u8> {
    let n = match v {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            None => {
                let f = n.as_f64()?;
                if !f.is_finite() {
                    return None;
                }
                f.trunc() as i64
            }
        },
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (MIN_SCORE..=MAX_SCORE).contains(&n).then_some(n as u8)
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Yields every balanced `{...}` span that decodes as a JSON object, in
/// order of their opening brace.
///
/// Quotes and escapes are tracked only inside a span, so stray quotes in
/// surrounding prose cannot swallow the object. A span that fails to decode
/// (or never closes) only gives up its opening brace: scanning resumes one
/// byte later, which still finds objects nested inside it or following it.
struct BalancedObjects<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> BalancedObjects<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl Iterator for BalancedObjects<'_> {
    type Item = Map<String, Value>;

    fn next(&mut self) -> Option<Self::Item> {
        'scan: loop {
            let base = self.pos;
            let rest = self.text.get(base..)?;

            let mut depth = 0usize;
            let mut in_str = false;
            let mut esc = false;
            let mut start = base;

            for (off, ch) in rest.char_indices() {
                let i = base + off;
                if in_str {
                    if esc {
                        esc = false;
                    } else if ch == '\\' {
                        esc = true;
                    } else if ch == '"' {
                        in_str = false;
                    }
                    continue;
                }

                match ch {
                    '{' => {
                        if depth == 0 {
                            start = i;
                        }
                        depth += 1;
                    }
                    '"' if depth > 0 => in_str = true,
                    '}' if depth > 0 => {
                        depth -= 1;
                        if depth == 0 {
                            if let Ok(Value::Object(map)) =
                                serde_json::from_str::<Value>(&self.text[start..=i])
                            {
                                self.pos = i + 1;
                                return Some(map);
                            }
                            self.pos = start + 1;
                            continue 'scan;
                        }
                    }
                    _ => {}
                }
            }

            if depth > 0 {
                // unterminated span
                self.pos = start + 1;
                continue 'scan;
            }
            self.pos = self.text.len();
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_object_round_trips_every_score() {
        for s in 0..=3u8 {
            let text = format!(r#"{{"score": {}, "reason": "ok"}}"#, s);
            assert_eq!(parse_score_and_reason(&text), (Some(s), Some("ok".into())));
        }
    }

    #[test]
    fn out_of_range_score_is_rejected() {
        assert_eq!(parse_score_and_reason(r#"{"score": 7}"#), (None, None));
        assert_eq!(parse_score_and_reason(r#"{"score": -1}"#), (None, None));
        assert_eq!(parse_score_and_reason(r#"{"score": "high"}"#), (None, None));
    }

    #[test]
    fn textual_fallback_without_json() {
        assert_eq!(parse_score_and_reason("noise score: 1 noise"), (Some(1), None));
        assert_eq!(parse_score_and_reason("Final SCORE = 3."), (Some(3), None));
        assert_eq!(parse_score_and_reason("score: 4"), (None, None));
        assert_eq!(parse_score_and_reason("no verdict here"), (None, None));
    }

    #[test]
    fn code_fence_is_stripped() {
        let text = "```json\n{\"score\": 2, \"reason\": \"partial answer\"}\n```";
        assert_eq!(
            parse_score_and_reason(text),
            (Some(2), Some("partial answer".into()))
        );
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("no fence"), "no fence");
    }

    #[test]
    fn trailing_commentary_does_not_break_first_object() {
        let text = r#"{"score": 1} and then I changed my mind {oops}"#;
        assert_eq!(parse_score_and_reason(text), (Some(1), None));
    }

    #[test]
    fn malformed_span_is_skipped_for_a_later_one() {
        let text = r#"thinking {not json at all} final: {"score": 3, "reason": "exact"}"#;
        assert_eq!(parse_score_and_reason(text), (Some(3), Some("exact".into())));
    }

    #[test]
    fn object_nested_in_malformed_span_is_found() {
        let text = r#"{ verdict: {"score": 2} }"#;
        assert_eq!(parse_score_and_reason(text), (Some(2), None));
    }

    #[test]
    fn unterminated_prefix_does_not_hide_object() {
        let text = r#"Sure { here it is: {"score": 0, "reason": "off topic"}"#;
        assert_eq!(
            parse_score_and_reason(text),
            (Some(0), Some("off topic".into()))
        );
    }

    #[test]
    fn braces_and_quotes_inside_strings_are_ignored() {
        let text = r#"{"reason": "uses } and \" inside", "score": 2}"#;
        assert_eq!(
            parse_score_and_reason(text),
            (Some(2), Some(r#"uses } and " inside"#.into()))
        );
    }

    #[test]
    fn object_without_score_falls_through_to_later_object() {
        let text = r#"{"note": "draft"} {"score": 1}"#;
        assert_eq!(parse_score_and_reason(text), (Some(1), None));
    }

    #[test]
    fn keys_are_case_insensitive_and_values_coerced() {
        let text = r#"{"SCORE": "2", "Reason": 5}"#;
        assert_eq!(parse_score_and_reason(text), (Some(2), Some("5".into())));

        let text = r#"{"Score": 3.0, "reason": true}"#;
        assert_eq!(parse_score_and_reason(text), (Some(3), Some("true".into())));
    }

    #[test]
    fn non_scalar_reason_is_dropped() {
        let text = r#"{"score": 1, "reason": ["a", "b"]}"#;
        assert_eq!(parse_score_and_reason(text), (Some(1), None));
    }

    #[test]
    fn greedy_span_would_have_failed() {
        // A first-brace-to-last-brace match spans both objects and does not decode.
        let text = r#"{"score": 2} {"score": 0}"#;
        assert_eq!(parse_score_and_reason(text), (Some(2), None));
    }
}
