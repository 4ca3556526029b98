//! Answer text normalisation.
//!
//! The helper's text content is not always clean prose. Depending on the
//! helper version it may arrive:
//!
//! - double-encoded, with literal `\n` / `\t` / `\r` two-character escapes;
//! - wrapped in one or more JSON objects carrying the real text under an
//!   `answer` key, possibly encoded as a string inside another answer;
//! - with bracketed citation markers such as `[1]`, `[2, 3]` or `[4-6]`;
//! - with fragments of the helper's own result envelope left around it
//!   (`{"status":"success","answer":"` … `","conversation_id":"…"}`).
//!
//! [`normalize_answer`] undoes all of these. It never fails and is
//! idempotent: the cleaning pass is repeated until the text stops changing.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// Maximum number of nested `answer` objects unwrapped in one pass.
pub const MAX_UNWRAP_DEPTH: usize = 8;

/// Compiled removal patterns.
struct Patterns {
    citations: Regex,
    envelope_prefix: Regex,
    envelope_suffix: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                // [1]   [1, 2]   [1,2,3]   [4-6]
                citations: Regex::new(r"\[\d+(?:(?:,\s*\d+)*|-\d+)\]").ok()?,
                envelope_prefix: Regex::new(r#"\{"status":"success",\s*"answer":""#).ok()?,
                envelope_suffix: Regex::new(r#"","conversation_id":"[^"]*"\}"#).ok()?,
            })
        })
        .as_ref()
}

/// Recover presentation-clean answer text from raw tool output.
///
/// Applied in order:
/// 1. literal `\n` and `\t` escapes become real newlines and tabs, literal
///    `\r` escapes are dropped;
/// 2. if an embedded JSON object with a string `answer` is found (scanning
///    from the rightmost `{`), its value is cleaned instead and returned;
/// 3. citation markers are removed;
/// 4. leaked envelope fragments are removed;
/// 5. surrounding whitespace is trimmed.
///
/// The steps are repeated until the text stops changing. Every pass returns
/// either the same text or a strictly shorter one, so this terminates.
#[must_use]
pub fn normalize_answer(raw: &str) -> String {
    let mut current = clean(raw, 0);
    loop {
        let next = clean(&current, 0);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn clean(text: &str, depth: usize) -> String {
    let text = unescape(text);

    if depth < MAX_UNWRAP_DEPTH {
        if let Some(inner) = nested_answer(&text) {
            return clean(&inner, depth + 1);
        }
    }

    let Some(patterns) = patterns() else {
        return text.trim().to_owned();
    };
    let text = patterns.citations.replace_all(&text, "");
    let text = patterns.envelope_prefix.replace_all(&text, "");
    let text = patterns.envelope_suffix.replace_all(&text, "");
    text.trim().to_owned()
}

fn unescape(text: &str) -> String {
    text.replace("\\n", "\n")
        .replace("\\r", "")
        .replace("\\t", "\t")
}

/// First `answer` string found in a balanced JSON object, trying candidate
/// objects from the rightmost opening brace backwards.
fn nested_answer(text: &str) -> Option<String> {
    if !text.contains("\"answer\"") {
        return None;
    }

    text.match_indices('{').rev().find_map(|(start, _)| {
        let candidate = balanced_object(&text[start..])?;
        let value = parse_object(candidate)?;
        value.get("answer")?.as_str().map(str::to_owned)
    })
}

/// Prefix of `text` (which starts with `{`) up to its matching `}`.
///
/// Braces inside JSON string literals do not count.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=idx]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse `candidate`, retrying with control characters inside string
/// literals re-escaped (step 1 may have turned `\n` escapes into raw
/// newlines, which JSON forbids inside strings).
fn parse_object(candidate: &str) -> Option<Value> {
    serde_json::from_str::<Value>(candidate)
        .ok()
        .or_else(|| serde_json::from_str(&escape_string_controls(candidate)).ok())
        .filter(Value::is_object)
}

fn escape_string_controls(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in json.chars() {
        if in_string {
            match ch {
                _ if escaped => {
                    escaped = false;
                    out.push(ch);
                }
                '\\' => {
                    escaped = true;
                    out.push(ch);
                }
                '"' => {
                    in_string = false;
                    out.push(ch);
                }
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                '\r' => out.push_str("\\r"),
                _ => out.push(ch),
            }
        } else {
            if ch == '"' {
                in_string = true;
            }
            out.push(ch);
        }
    }

    out
}
