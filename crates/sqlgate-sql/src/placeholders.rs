//! Placeholder and callable-escape rewriting.
//!
//! Clients always write positional `?` markers. PostgreSQL wants `$1..$n`,
//! and neither engine understands the `{call ...}` escape syntax.
//!
//! A `?` directly followed by `|` or `&` is the PostgreSQL `jsonb` operator
//! `?|` or `?&` and is left alone. A bare `?` is always a marker, so the
//! `jsonb` key-exists operator must be written as `jsonb_exists(doc, key)`.

use regex::Regex;
use std::sync::LazyLock;

static CALL_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*\{\s*(\?\s*=\s*)?call\s+(.+?)\s*\}\s*;?\s*$")
        .expect("valid call escape regex")
});

/// A callable statement with the escape braces removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallableSql {
    /// Executable SQL (`CALL p(?)` or `SELECT f(?)`).
    pub sql: String,
    /// Whether the escape declared a `? =` return value. That marker is
    /// dropped from `sql`, so parameter 1 maps to the first result column.
    pub has_return_value: bool,
}

/// Rewrite `{call p(?)}` and `{? = call f(?)}` escapes.
///
/// Text that is not an escape is returned unchanged.
pub fn unescape_call(sql: &str) -> CallableSql {
    match CALL_ESCAPE.captures(sql) {
        Some(caps) => {
            let body = caps.get(2).map_or("", |m| m.as_str());
            let has_return_value = caps.get(1).is_some();
            let sql = if has_return_value {
                format!("SELECT {body}")
            } else {
                format!("CALL {body}")
            };
            CallableSql {
                sql,
                has_return_value,
            }
        }
        None => CallableSql {
            sql: sql.to_string(),
            has_return_value: false,
        },
    }
}

/// Rewrite `?` markers outside literals, quoted identifiers and comments
/// to `$1`, `$2`, ... in order.
pub fn to_numbered(sql: &str) -> String {
    let mut n = 0;
    scan(sql, |_| {
        n += 1;
        Some(format!("${n}"))
    })
}

/// Walk `sql`, calling `on_marker` for every bare `?`. When it returns a
/// replacement the marker is substituted in the output.
fn scan(sql: &str, mut on_marker: impl FnMut(usize) -> Option<String>) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        Literal,
        Identifier,
        LineComment,
        BlockComment,
    }

    let mut out = String::with_capacity(sql.len() + 8);
    let mut state = State::Code;
    let mut chars = sql.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        let next = chars.peek().map(|(_, c)| *c);
        match state {
            State::Code => match c {
                '\'' => state = State::Literal,
                '"' => state = State::Identifier,
                '-' if next == Some('-') => state = State::LineComment,
                '/' if next == Some('*') => state = State::BlockComment,
                '?' if next != Some('|') && next != Some('&') => {
                    if let Some(replacement) = on_marker(pos) {
                        out.push_str(&replacement);
                        continue;
                    }
                }
                _ => {}
            },
            State::Literal => {
                if c == '\'' {
                    if next == Some('\'') {
                        out.push(c);
                        chars.next();
                    } else {
                        state = State::Code;
                    }
                }
            }
            State::Identifier => {
                if c == '"' {
                    state = State::Code;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if c == '*' && next == Some('/') {
                    out.push(c);
                    chars.next();
                    out.push('/');
                    state = State::Code;
                    continue;
                }
            }
        }
        out.push(c);
    }

    out
}
