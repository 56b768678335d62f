//! Text format of settings files.
//!
//! Settings are written as indented JSON. Non-ASCII and HTML-sensitive
//! characters are written as-is; `serde_json` only escapes what JSON requires.
//! Enum fields are expected to carry `#[serde(rename_all = "camelCase")]` so
//! they are written as lower-camel-case strings.
//!
//! Reading is more lenient than writing: a leading byte-order mark is ignored
//! and a trailing comma before `}` or `]` is accepted, as files are often
//! edited by hand.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;

/// Serializes settings to pretty-printed JSON.
pub fn to_text<S: Serialize>(settings: &S) -> serde_json::Result<String> {
    serde_json::to_string_pretty(settings)
}

/// Parses settings text, tolerating trailing commas.
pub fn from_text<S: DeserializeOwned>(text: &str) -> serde_json::Result<S> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    serde_json::from_str(&strip_trailing_commas(text))
}

/// Removes commas that directly precede a closing `}` or `]`.
///
/// Only a comma that follows a value is a trailing comma; one that follows
/// `{`, `[` or another comma is kept so the parser rejects it. Commas inside
/// string literals are left alone, as is anything else that makes the text
/// invalid JSON.
pub fn strip_trailing_commas(text: &str) -> Cow<'_, str> {
    let mut out: Option<String> = None;
    let mut in_string = false;
    let mut escaped = false;
    // Last non-whitespace character kept outside a string
    let mut last: Option<char> = None;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                last = Some(c);
            }
        } else if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = text[i + 1..].trim_start().chars().next();
            if matches!(next, Some('}') | Some(']')) && last.is_some_and(ends_value) {
                out.get_or_insert_with(|| text[..i].to_string());
                continue;
            }
            last = Some(c);
        } else if !c.is_whitespace() {
            last = Some(c);
        }

        if let Some(out) = out.as_mut() {
            out.push(c);
        }
    }

    match out {
        Some(out) => Cow::Owned(out),
        None => Cow::Borrowed(text),
    }
}

/// Whether `c` can be the last character of a JSON value.
fn ends_value(c: char) -> bool {
    c == '"' || c == '}' || c == ']' || c.is_ascii_alphanumeric()
}
