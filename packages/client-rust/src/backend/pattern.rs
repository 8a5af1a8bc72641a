//! Glob-style key patterns, as accepted by the `keys` command.
//!
//! Supported syntax: `*` (any run of bytes), `?` (exactly one byte),
//! `[abc]` / `[a-z]` / `[^a]` character classes, and `\` to escape the next
//! character.
//!
//! Keys are matched as raw bytes. Non-ASCII characters in a pattern match
//! their UTF-8 encoding, so `?` stands for one byte, not one character.

use keyshard_core::BackendError;
use regex::bytes::Regex;

/// A compiled key pattern.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    source: String,
    regex: Regex,
}

impl KeyPattern {
    /// Compiles a glob pattern.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::InvalidPattern` for an unterminated class or a
    /// class the regex engine rejects.
    pub fn compile(pattern: &str) -> Result<Self, BackendError> {
        let translated = translate(pattern)?;
        let regex = Regex::new(&translated)
            .map_err(|e| BackendError::InvalidPattern(format!("{pattern}: {e}")))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Returns `true` if `key` matches the whole pattern.
    #[must_use]
    pub fn matches(&self, key: &[u8]) -> bool {
        self.regex.is_match(key)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Appends `c` as a literal. ASCII goes through `regex::escape`; anything
/// else becomes one `\xNN` escape per UTF-8 byte so it matches in byte mode.
fn push_literal(out: &mut String, c: char) {
    let mut buf = [0u8; 4];
    let encoded = c.encode_utf8(&mut buf);
    if c.is_ascii() {
        out.push_str(&regex::escape(encoded));
    } else {
        for byte in encoded.bytes() {
            out.push_str(&format!("\\x{byte:02X}"));
        }
    }
}

/// Translates a glob into an anchored, byte-oriented regex.
fn translate(pattern: &str) -> Result<String, BackendError> {
    let mut out = String::with_capacity(pattern.len() * 2 + 10);
    out.push_str("(?s-u)^");

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => push_literal(&mut out, chars.next().unwrap_or('\\')),
            '[' => translate_class(pattern, &mut chars, &mut out)?,
            other => push_literal(&mut out, other),
        }
    }

    out.push('$');
    Ok(out)
}

/// Translates the body of a `[...]` class; the opening bracket is consumed.
///
/// A byte class cannot hold a multibyte character, so each one becomes its
/// own alternative next to the ASCII members: `[aé]` is `(?:[a]|\xC3\xA9)`.
/// Multibyte characters are rejected in negated classes and as range bounds,
/// where no byte-level equivalent exists.
fn translate_class(
    pattern: &str,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    out: &mut String,
) -> Result<(), BackendError> {
    let invalid = |reason: &str| BackendError::InvalidPattern(format!("{pattern}: {reason}"));

    let negated = chars.next_if_eq(&'^').is_some();
    let mut members = String::new();
    let mut multibyte = Vec::new();
    let mut closed = false;
    let mut empty = true;
    let mut last_ascii = false;
    let mut in_range = false;

    while let Some(c) = chars.next() {
        let c = match c {
            ']' if !empty => {
                closed = true;
                break;
            }
            '-' if !empty && chars.peek().is_some_and(|&n| n != ']') => {
                if !last_ascii {
                    return Err(invalid("non-ASCII range bound"));
                }
                members.push('-');
                in_range = true;
                continue;
            }
            '\\' => chars.next().unwrap_or('\\'),
            other => other,
        };
        empty = false;
        last_ascii = c.is_ascii();
        if last_ascii {
            push_literal(&mut members, c);
        } else if in_range {
            return Err(invalid("non-ASCII range bound"));
        } else if negated {
            return Err(invalid("non-ASCII character in negated class"));
        } else {
            let mut sequence = String::new();
            push_literal(&mut sequence, c);
            multibyte.push(sequence);
        }
        in_range = false;
    }

    if !closed {
        return Err(invalid("unterminated character class"));
    }

    let class = format!("[{}{members}]", if negated { "^" } else { "" });
    if multibyte.is_empty() {
        out.push_str(&class);
    } else {
        out.push_str("(?:");
        if !members.is_empty() {
            out.push_str(&class);
            out.push('|');
        }
        out.push_str(&multibyte.join("|"));
        out.push(')');
    }
    Ok(())
}
