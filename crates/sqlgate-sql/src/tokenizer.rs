//! Lightweight SQL tokenizer.
//!
//! The classifier and several firewall managers only need statement kind,
//! table names and comment markers, so instead of a grammar this module
//! pads operators and punctuation with blanks and splits on whitespace.
//! Operators are swapped for opaque markers before padding so that `<=`
//! is never split into `<` and `=` by a later, shorter match.

/// Recognized operators, longest first.
const OPERATORS: &[&str] = &[
    "<=>", "!=", "<>", "<=", ">=", "<<", ">>", "||", "&&", "--", "/*", "*/", "=", "<", ">", "+",
    "-", "*", "/", "%", "&", "|", "^", "~", "!", "#",
];

const PUNCTUATION: &[char] = &['(', ')', ',', ';'];

const MARKER: char = '\u{1}';

/// Reserved words that are upper-cased by [`tokenize`].
const KEYWORDS: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "BEGIN", "BETWEEN", "BY", "CALL", "CASCADE",
    "CASE", "COLUMN", "COMMIT", "CONSTRAINT", "CREATE", "CROSS", "DATABASE", "DEFAULT", "DELETE",
    "DESC", "DISTINCT", "DROP", "ELSE", "END", "EXCEPT", "EXISTS", "FOREIGN", "FROM", "FULL",
    "GRANT", "GROUP", "HAVING", "IF", "IN", "INDEX", "INNER", "INSERT", "INTERSECT", "INTO", "IS",
    "JOIN", "KEY", "LEFT", "LIKE", "LIMIT", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER",
    "PRIMARY", "PROCEDURE", "REFERENCES", "RELEASE", "RESTRICT", "REVOKE", "RIGHT", "ROLLBACK",
    "SAVEPOINT", "SCHEMA", "SELECT", "SEQUENCE", "SET", "TABLE", "THEN", "TO", "TRANSACTION",
    "TRIGGER", "TRUNCATE", "UNION", "UNIQUE", "UPDATE", "USING", "VALUES", "VIEW", "WHEN", "WHERE",
    "WITH",
];

/// A run of SQL text either inside or outside a single-quoted literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlSegment<'a> {
    /// Text outside any literal.
    Code(&'a str),
    /// A literal including its surrounding quotes.
    Literal(&'a str),
}

/// Surround operators and structural punctuation with blanks.
///
/// ```
/// use sqlgate_sql::tokenizer::normalize;
///
/// let normalized = normalize("a<=b");
/// assert_eq!(normalized.split_whitespace().collect::<Vec<_>>(), ["a", "<=", "b"]);
/// ```
pub fn normalize(sql: &str) -> String {
    let mut out = sql.replace(MARKER, " ");

    for (idx, op) in OPERATORS.iter().enumerate() {
        if out.contains(op) {
            out = out.replace(op, &marker(idx));
        }
    }

    for p in PUNCTUATION {
        if out.contains(*p) {
            out = out.replace(*p, &format!(" {p} "));
        }
    }

    for (idx, op) in OPERATORS.iter().enumerate() {
        let m = marker(idx);
        if out.contains(&m) {
            out = out.replace(&m, &format!(" {op} "));
        }
    }

    out
}

fn marker(idx: usize) -> String {
    format!("{MARKER}{idx}{MARKER}")
}

/// Split `sql` into code and single-quoted literal segments.
///
/// A doubled quote inside a literal is an escaped quote, not a terminator.
/// An unterminated literal runs to the end of the input.
pub fn split_on_single_quotes(sql: &str) -> Vec<SqlSegment<'_>> {
    let bytes = sql.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\'' {
            i += 1;
            continue;
        }

        if i > start {
            segments.push(SqlSegment::Code(&sql[start..i]));
        }

        let literal_start = i;
        i += 1;
        loop {
            match bytes.get(i) {
                None => break,
                Some(b'\'') if bytes.get(i + 1) == Some(&b'\'') => i += 2,
                Some(b'\'') => {
                    i += 1;
                    break;
                }
                Some(_) => i += 1,
            }
        }
        segments.push(SqlSegment::Literal(&sql[literal_start..i]));
        start = i;
    }

    if start < bytes.len() {
        segments.push(SqlSegment::Code(&sql[start..]));
    }

    segments
}

/// Tokenize `sql` into classifiable tokens.
///
/// Keywords are upper-cased, everything else outside literals is
/// lower-cased, and each literal stays one token with its original text.
pub fn tokenize(sql: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for segment in split_on_single_quotes(sql) {
        match segment {
            SqlSegment::Literal(text) => tokens.push(text.to_string()),
            SqlSegment::Code(text) => {
                tokens.extend(normalize(text).split_whitespace().map(fold_case));
            }
        }
    }
    tokens
}

/// Canonical single-spaced form of a statement, used for list matching.
pub fn canonical(sql: &str) -> String {
    let tokens = tokenize(sql);
    let end = tokens
        .iter()
        .rposition(|t| t != ";")
        .map_or(0, |pos| pos + 1);
    tokens[..end].join(" ")
}

/// Whether `word` is a reserved keyword (case-insensitive).
pub fn is_keyword(word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    KEYWORDS.contains(&upper.as_str())
}

fn fold_case(token: &str) -> String {
    let upper = token.to_ascii_uppercase();
    if KEYWORDS.contains(&upper.as_str()) {
        upper
    } else {
        token.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn words(s: &str) -> Vec<&str> {
        s.split_whitespace().collect()
    }

    #[test]
    fn test_normalize_glued_operators() {
        assert_eq!(words(&normalize("a<=>b")), ["a", "<=>", "b"]);
        assert_eq!(words(&normalize("a<>b")), ["a", "<>", "b"]);
        assert_eq!(words(&normalize("a!=b")), ["a", "!=", "b"]);
        assert_eq!(words(&normalize("x<<2>>1")), ["x", "<<", "2", ">>", "1"]);
        assert_eq!(words(&normalize("a>=b||c")), ["a", ">=", "b", "||", "c"]);
    }

    #[test]
    fn test_normalize_comments_and_punctuation() {
        assert_eq!(
            words(&normalize("f(a,b)--x")),
            ["f", "(", "a", ",", "b", ")", "--", "x"]
        );
        assert_eq!(words(&normalize("a/*c*/b")), ["a", "/*", "c", "*/", "b"]);
        assert_eq!(words(&normalize("1#c")), ["1", "#", "c"]);
    }

    #[test]
    fn test_split_on_single_quotes() {
        let segments = split_on_single_quotes("a = 'it''s' AND b = ''");
        assert_eq!(
            segments,
            vec![
                SqlSegment::Code("a = "),
                SqlSegment::Literal("'it''s'"),
                SqlSegment::Code(" AND b = "),
                SqlSegment::Literal("''"),
            ]
        );
    }

    #[test]
    fn test_split_unterminated_literal() {
        let segments = split_on_single_quotes("x = 'abc");
        assert_eq!(
            segments,
            vec![SqlSegment::Code("x = "), SqlSegment::Literal("'abc")]
        );
    }

    #[test]
    fn test_tokenize_case_folding() {
        assert_eq!(
            tokenize("select Name from Customer where id>=?"),
            ["SELECT", "name", "FROM", "customer", "WHERE", "id", ">=", "?"]
        );
    }

    #[test]
    fn test_tokenize_keeps_literals_intact() {
        assert_eq!(
            tokenize("SELECT * FROM t WHERE s = 'a<=b, DROP'"),
            ["SELECT", "*", "FROM", "t", "WHERE", "s", "=", "'a<=b, DROP'"]
        );
    }

    #[test]
    fn test_canonical_drops_trailing_semicolons() {
        assert_eq!(
            canonical("select *\n  from   T ;;"),
            "SELECT * FROM t"
        );
        assert_eq!(canonical(""), "");
    }

    #[test]
    fn test_is_keyword() {
        assert!(is_keyword("select"));
        assert!(is_keyword("Grant"));
        assert!(!is_keyword("customer"));
    }
}
