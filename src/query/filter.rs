//! Filter clause parsing.
//!
//! A filter is a SQL boolean expression in which `Object(field)` (or a bare
//! `field` of the first object) stands for a column, optionally followed by
//! `ORDER BY ...` and `LIMIT n`. It is parsed once into a list of
//! [`FilterPart`]s: literal SQL fragments interleaved with field references.
//! Quoted literals are never inspected, so `'Object(field)'` inside a string
//! stays text.

use super::QueryError;
use crate::db::escape::for_each_outside_literals;
use crate::schema::is_valid_field_name;

const ORDER_BY: &str = "ORDER BY ";
const LIMIT: &str = "LIMIT ";

/// Decides which words of a filter are references.
pub trait NameResolver {
    /// `name` is an object of the query.
    fn is_object(&self, name: &str) -> bool;

    /// `name` is a field of the first object.
    fn is_default_field(&self, name: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterPart {
    Sql(String),
    /// `object` is `None` for bare field names.
    Field { object: Option<String>, field: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFilter {
    pub condition: Vec<FilterPart>,
    pub order_by: Option<Vec<FilterPart>>,
    pub limit: Option<String>,
}

impl ParsedFilter {
    /// Every field reference, condition first.
    pub fn fields(&self) -> impl Iterator<Item = (&Option<String>, &String)> {
        self.condition
            .iter()
            .chain(self.order_by.iter().flatten())
            .filter_map(|part| match part {
                FilterPart::Field { object, field } => Some((object, field)),
                FilterPart::Sql(_) => None,
            })
    }
}

/// Find `keyword` outside literals at or after byte `from`, preceded by the
/// start of the text or at least one space.
fn find_keyword(text: &str, keyword: &str, from: usize) -> Option<usize> {
    let mut found = None;
    for_each_outside_literals(text, |pos, _| {
        if found.is_none()
            && pos >= from
            && text[pos..].starts_with(keyword)
            && (pos == 0 || text[..pos].ends_with(' '))
        {
            found = Some(pos);
        }
    });
    found
}

/// Parse a filter clause.
pub fn parse_filter(filter: &str, resolver: &dyn NameResolver) -> Result<ParsedFilter, QueryError> {
    let order_pos = find_keyword(filter, ORDER_BY, 0);
    let limit_pos = find_keyword(filter, LIMIT, order_pos.unwrap_or(0));

    let condition_end = order_pos.or(limit_pos).unwrap_or(filter.len());
    let condition = tokenize(filter[..condition_end].trim(), resolver)?;

    let order_by = match order_pos {
        Some(start) => {
            let end = limit_pos.unwrap_or(filter.len());
            Some(tokenize(filter[start + ORDER_BY.len()..end].trim(), resolver)?)
        }
        None => None,
    };

    let limit = match limit_pos {
        Some(start) => {
            let value = filter[start + LIMIT.len()..].trim();
            if value != "?" && (value.is_empty() || !value.chars().all(|c| c.is_ascii_digit())) {
                return Err(QueryError::InvalidLimit {
                    value: value.to_string(),
                });
            }
            Some(value.to_string())
        }
        None => None,
    };

    Ok(ParsedFilter {
        condition,
        order_by,
        limit,
    })
}

/// Parse `Object(field)` or a bare `field`.
pub fn parse_field_ref(spec: &str) -> Result<(Option<String>, String), QueryError> {
    let spec = spec.trim();
    let invalid = || QueryError::InvalidFieldRef {
        spec: spec.to_string(),
    };
    match spec.split_once('(') {
        Some((object, rest)) => {
            let field = rest.strip_suffix(')').ok_or_else(invalid)?.trim();
            if object.is_empty() || !is_valid_field_name(field) {
                return Err(invalid());
            }
            Ok((Some(object.to_string()), field.to_string()))
        }
        None if is_valid_field_name(spec) => Ok((None, spec.to_string())),
        None => Err(invalid()),
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

struct Scanner<'a> {
    text: &'a str,
    chars: Vec<(usize, char)>,
    parts: Vec<FilterPart>,
    sql: String,
}

impl<'a> Scanner<'a> {
    fn byte(&self, index: usize) -> usize {
        self.chars.get(index).map_or(self.text.len(), |(pos, _)| *pos)
    }

    fn char_at(&self, index: usize) -> Option<char> {
        self.chars.get(index).map(|(_, c)| *c)
    }

    fn scan_while(&self, start: usize, accept: impl Fn(char) -> bool) -> usize {
        let mut end = start;
        while self.char_at(end).is_some_and(&accept) {
            end += 1;
        }
        end
    }

    fn push_field(&mut self, object: Option<String>, field: &str) {
        if !self.sql.is_empty() {
            self.parts.push(FilterPart::Sql(std::mem::take(&mut self.sql)));
        }
        self.parts.push(FilterPart::Field {
            object,
            field: field.to_string(),
        });
    }

    /// `Object(field)` starting at `start`; returns the index after `)`.
    ///
    /// A capitalized word shaped like a field reference must name an object of
    /// the query. All upper-case words are SQL functions and stay text.
    fn object_ref(&mut self, start: usize, resolver: &dyn NameResolver) -> Result<usize, QueryError> {
        let end = self.scan_while(start, |c| c.is_ascii_alphanumeric());
        let word = &self.text[self.byte(start)..self.byte(end)];
        if self.char_at(end) == Some('(') {
            let close = self.scan_while(end + 1, |c| c != ')');
            if self.char_at(close) == Some(')') {
                let field = self.text[self.byte(end + 1)..self.byte(close)].trim();
                if is_valid_field_name(field) {
                    if resolver.is_object(word) {
                        let object = word.to_string();
                        let field = field.to_string();
                        self.push_field(Some(object), &field);
                        return Ok(close + 1);
                    }
                    if word.chars().any(|c| c.is_ascii_lowercase()) {
                        return Err(QueryError::UnknownObject {
                            name: word.to_string(),
                        });
                    }
                }
            }
        }
        self.sql.push_str(word);
        Ok(end)
    }

    /// A bare lower-case word starting at `start`.
    fn bare_ref(&mut self, start: usize, resolver: &dyn NameResolver) -> usize {
        let mut end = self.scan_while(start, |c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'
        });
        while end > start + 1 && self.char_at(end - 1) == Some('-') {
            end -= 1;
        }
        let word = &self.text[self.byte(start)..self.byte(end)];
        let qualified = start > 0 && self.char_at(start - 1) == Some('.');
        let next = self.chars[end..]
            .iter()
            .map(|(_, c)| *c)
            .find(|c| !c.is_whitespace());
        let call_or_qualifier = matches!(next, Some('(') | Some('.'))
            || self.char_at(end).is_some_and(is_word_char);
        if !qualified && !call_or_qualifier && resolver.is_default_field(word) {
            let word = word.to_string();
            self.push_field(None, &word);
        } else {
            self.sql.push_str(word);
        }
        end
    }
}

fn tokenize(text: &str, resolver: &dyn NameResolver) -> Result<Vec<FilterPart>, QueryError> {
    let mut scanner = Scanner {
        text,
        chars: text.char_indices().collect(),
        parts: Vec::new(),
        sql: String::new(),
    };
    let mut quote: Option<char> = None;
    let mut i = 0;
    while let Some(c) = scanner.char_at(i) {
        if let Some(q) = quote {
            scanner.sql.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        if c == '\'' || c == '"' {
            quote = Some(c);
            scanner.sql.push(c);
            i += 1;
            continue;
        }
        let at_boundary = i == 0 || scanner.char_at(i - 1).is_none_or(|p| !is_word_char(p));
        if at_boundary && c.is_ascii_uppercase() {
            i = scanner.object_ref(i, resolver)?;
        } else if at_boundary && c.is_ascii_lowercase() {
            i = scanner.bare_ref(i, resolver);
        } else {
            scanner.sql.push(c);
            i += 1;
        }
    }
    if !scanner.sql.is_empty() {
        scanner.parts.push(FilterPart::Sql(scanner.sql));
    }
    Ok(scanner.parts)
}
