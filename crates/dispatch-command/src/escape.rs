//! Shell-injection-safe quoting for strings embedded in a double-quoted
//! shell argument (spec §4.2).
//!
//! The five characters below cover parameter expansion (`$`), command
//! substitution (both `` ` `` and `$()`, the latter via the same `$`
//! rule), quote closure (`"`), history expansion (`!`), and the escape
//! character itself (`\`). Semicolons, pipes, redirects, and globs are
//! harmless inside double quotes and are intentionally left untouched so
//! ordinary user messages stay readable.

/// Escape `input` for safe embedding inside a double-quoted shell argument.
///
/// Order matters: `\` must be escaped first, or the backslashes introduced
/// by the other rules would themselves get re-escaped.
pub fn escape_double_quoted(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str(r"\\"),
            '$' => out.push_str(r"\$"),
            '`' => out.push_str(r"\`"),
            '"' => out.push_str("\\\""),
            '!' => out.push_str(r"\!"),
            other => out.push(other),
        }
    }
    out
}

/// Inverse of [`escape_double_quoted`] — simulates how `/bin/sh` would
/// interpret the escaped string inside a double-quoted argument. Used only
/// by tests to verify the round-trip property (spec §8, testable property
/// 6): re-escaping an already-escaped string, then interpreting it as a
/// shell would, reproduces the original input.
#[cfg(test)]
fn shell_interpret_double_quoted(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, '\\' | '$' | '`' | '"' | '!') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
            out.push(ch);
        } else {
            out.push(ch);
        }
    }
    out
}
