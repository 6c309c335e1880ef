use sha2::{Digest, Sha256};

pub const PROMPT_TMPL: &str = r#"You are a relevance judge for document retrieval.
Rate how relevant the DOCUMENT is to the user QUERY on a 0-3 scale:

0 = Irrelevant: The passage has nothing to do with the query.
1 = Related: The passage seems related to the query but does not answer it.
2 = Highly relevant: The passage has some answer for the query, but the answer may be a bit unclear, or hidden amongst extraneous information.
3 = Perfectly relevant: The passage is dedicated to the query and contains the exact answer.

Return strict JSON ONLY with key: score (0,1,2,3).

QUERY:
{query}

DOCUMENT (passage text):
{text}
"#;

pub const PROMPT_TMPL_WITH_REASON: &str = r#"You are a relevance judge for document retrieval.
Rate how relevant the DOCUMENT is to the user QUERY on a 0-3 scale:

0 = Irrelevant: The passage has nothing to do with the query.
1 = Related: The passage seems related to the query but does not answer it.
2 = Highly relevant: The passage has some answer for the query, but the answer may be a bit unclear, or hidden amongst extraneous information.
3 = Perfectly relevant: The passage is dedicated to the query and contains the exact answer.

Return strict JSON ONLY with keys: score (0,1,2,3) and reason (one short sentence).

QUERY:
{query}

DOCUMENT (passage text):
{text}
"#;

pub fn choose_template(reasoning_enabled: bool) -> &'static str {
    if reasoning_enabled {
        PROMPT_TMPL_WITH_REASON
    } else {
        PROMPT_TMPL
    }
}

/// Fills `{query}` and `{text}` in a single pass, so placeholder-looking
/// text inside the query or document is never substituted again.
pub fn build_prompt(template: &str, query: &str, text: &str) -> String {
    let mut out = String::with_capacity(template.len() + query.len() + text.len());
    let mut rest = template;
    loop {
        let next_query = rest.find("{query}").map(|i| (i, "{query}", query));
        let next_text = rest.find("{text}").map(|i| (i, "{text}", text));
        let next = match (next_query, next_text) {
            (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
            (a, b) => a.or(b),
        };
        match next {
            Some((idx, placeholder, value)) => {
                out.push_str(&rest[..idx]);
                out.push_str(value);
                rest = &rest[idx + placeholder.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

/// Keeps at most `limit` characters (not bytes).
pub fn truncate_chars(text: &str, limit: Option<usize>) -> &str {
    match limit {
        Some(limit) => match text.char_indices().nth(limit) {
            Some((byte_idx, _)) => &text[..byte_idx],
            None => text,
        },
        None => text,
    }
}

pub fn prompt_hash(template: &str) -> String {
    let mut h = Sha256::new();
    h.update(template.as_bytes());
    hex::encode(h.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_prompt_is_deterministic_and_single_pass() {
        let a = build_prompt(PROMPT_TMPL, "what is {text}?", "doc body");
        let b = build_prompt(PROMPT_TMPL, "what is {text}?", "doc body");
        assert_eq!(a, b);
        assert!(a.contains("QUERY:\nwhat is {text}?\n"));
        assert!(a.contains("DOCUMENT (passage text):\ndoc body\n"));
        assert!(!a.contains("{query}"));
    }

    #[test]
    fn template_choice_follows_reasoning_flag() {
        assert!(choose_template(true).contains("reason"));
        assert_eq!(choose_template(false), PROMPT_TMPL);
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("héllo wörld", Some(4)), "héll");
        assert_eq!(truncate_chars("short", Some(10)), "short");
        assert_eq!(truncate_chars("short", Some(5)), "short");
        assert_eq!(truncate_chars("anything", None), "anything");
        assert_eq!(truncate_chars("abc", Some(0)), "");
    }

    #[test]
    fn prompt_hash_is_stable_sha256() {
        let h = prompt_hash(PROMPT_TMPL);
        assert_eq!(h.len(), 64);
        assert_eq!(h, prompt_hash(PROMPT_TMPL));
        assert_ne!(h, prompt_hash(PROMPT_TMPL_WITH_REASON));
    }
}
