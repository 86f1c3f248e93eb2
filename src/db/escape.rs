//! Identifier quoting, literal escaping and placeholder handling for SQL text.

use super::value::Value;

/// Quote an identifier with ANSI double quotes.
///
/// Both SQLite and PostgreSQL accept ANSI quoting, and quoting keeps reserved
/// words such as `order` usable as column names.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape a string for use inside a single-quoted SQL literal.
///
/// Standard SQL doubles the quote character; backslashes are left alone because
/// PostgreSQL runs with `standard_conforming_strings` on.
pub fn escape_string_single(s: &str) -> String {
    s.replace('\'', "''")
}

/// Render a value as an inline SQL literal.
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => format!("{:?}", f),
        Value::Float(_) => "NULL".to_string(),
        Value::Str(s) => format!("'{}'", escape_string_single(s)),
        Value::Bytes(b) => format!("'\\x{}'::bytea", hex::encode(b)),
    }
}

/// Visit every character of `sql` that sits outside a quoted literal or quoted
/// identifier, passing its byte offset.
pub fn for_each_outside_literals(sql: &str, mut visit: impl FnMut(usize, char)) {
    let mut quote: Option<char> = None;
    for (pos, c) in sql.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None => visit(pos, c),
        }
    }
}

/// Count the positional `?` placeholders outside literals.
pub fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    for_each_outside_literals(sql, |_, c| {
        if c == '?' {
            count += 1;
        }
    });
    count
}

/// Replace each positional `?` outside literals with the inline literal of the
/// matching parameter.
///
/// Returns `None` when the parameter count does not match the placeholders.
pub fn inline_parameters(sql: &str, params: &[Value]) -> Option<String> {
    let mut positions = Vec::new();
    for_each_outside_literals(sql, |pos, c| {
        if c == '?' {
            positions.push(pos);
        }
    });
    if positions.len() != params.len() {
        return None;
    }

    let mut result = String::with_capacity(sql.len() + params.len() * 8);
    let mut last = 0;
    for (pos, param) in positions.iter().zip(params) {
        result.push_str(&sql[last..*pos]);
        result.push_str(&sql_literal(param));
        last = pos + 1;
    }
    result.push_str(&sql[last..]);
    Some(result)
}

/// Build a comma-separated list of `n` placeholders.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_quote_identifier_doubles_quotes() {
        assert_eq!(quote_identifier("order"), "\"order\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[rstest]
    fn test_count_placeholders_skips_literals() {
        assert_eq!(count_placeholders("a = ? AND b = '?' AND c = \"?\""), 1);
        assert_eq!(count_placeholders("a IN (?, ?)"), 2);
    }

    #[rstest]
    fn test_inline_parameters() {
        let sql = inline_parameters(
            "SELECT * FROM t WHERE a = ? AND b = '?' AND c = ?",
            &[Value::Str("it's".into()), Value::Int(4)],
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = 'it''s' AND b = '?' AND c = 4");
    }

    #[rstest]
    fn test_inline_parameters_count_mismatch() {
        assert!(inline_parameters("a = ?", &[]).is_none());
    }

    #[rstest]
    fn test_placeholders() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(0), "");
    }
}
