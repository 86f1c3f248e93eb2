//! Object-name-list parsing.
//!
//! An object-name-list is a whitespace-separated sequence of object names,
//! each optionally followed by an instance number (`Feature2`), and `AND`
//! keywords that start a new join chain.

use std::fmt;

use super::QueryError;
use crate::schema::{is_valid_object_name, CrossingEntry, Metadata};

/// Instance numbers from this value up are reserved for tokens the engine
/// inserts itself.
pub const RESERVED_INSTANCE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    And,
    Object(ObjectToken),
}

/// An object name with its optional instance number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectToken {
    pub base: String,
    pub instance: Option<u32>,
}

impl ObjectToken {
    pub fn new(base: &str, instance: Option<u32>) -> Self {
        Self {
            base: base.to_string(),
            instance,
        }
    }

    /// The token as written, e.g. `Feature2`.
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Named by the caller rather than inserted during jump expansion.
    pub fn is_user(&self) -> bool {
        self.instance.is_none_or(|n| n < RESERVED_INSTANCE)
    }

    pub(crate) fn parse(text: &str) -> Result<Self, QueryError> {
        let digits = text.len() - text.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        let (base, suffix) = text.split_at(text.len() - digits);
        if !is_valid_object_name(base) {
            return Err(QueryError::MalformedToken {
                token: text.to_string(),
            });
        }
        let instance = if suffix.is_empty() {
            None
        } else {
            let n: u32 = suffix.parse().map_err(|_| QueryError::MalformedToken {
                token: text.to_string(),
            })?;
            if n >= RESERVED_INSTANCE {
                return Err(QueryError::ReservedInstance {
                    token: text.to_string(),
                });
            }
            Some(n)
        };
        Ok(Self::new(base, instance))
    }
}

impl fmt::Display for ObjectToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instance {
            Some(n) => write!(f, "{}{}", self.base, n),
            None => write!(f, "{}", self.base),
        }
    }
}

/// A parsed object-name-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectList {
    tokens: Vec<Token>,
}

impl ObjectList {
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        Self::from_tokens(text.split_whitespace())
    }

    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Result<Self, QueryError> {
        let tokens = tokens
            .into_iter()
            .map(|t| match t {
                "AND" => Ok(Token::And),
                other => ObjectToken::parse(other).map(Token::Object),
            })
            .collect::<Result<Vec<_>, _>>()?;
        if !tokens.iter().any(|t| matches!(t, Token::Object(_))) {
            return Err(QueryError::EmptyObjectList);
        }
        Ok(Self { tokens })
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectToken> {
        self.tokens.iter().filter_map(|t| match t {
            Token::Object(o) => Some(o),
            Token::And => None,
        })
    }

    /// The first object, which bare field names in a filter refer to.
    pub fn first(&self) -> Option<&ObjectToken> {
        self.objects().next()
    }

    /// Insert the connecting relationship between adjacent entities that have
    /// no direct crossing but a single-relationship jump.
    pub fn expand_jumps(&self, meta: &Metadata) -> Self {
        let mut next_instance = RESERVED_INSTANCE;
        let mut expanded = Vec::with_capacity(self.tokens.len());
        let mut prev: Option<&ObjectToken> = None;
        for token in &self.tokens {
            if let (Token::Object(cur), Some(p)) = (token, prev) {
                let direct: Option<&CrossingEntry> = meta.crossing.get(&p.base, &cur.base);
                if direct.is_none() {
                    if let Some(via) = meta.jumps.get(&p.base, &cur.base) {
                        expanded.push(Token::Object(ObjectToken::new(via, Some(next_instance))));
                        next_instance += 1;
                    }
                }
            }
            prev = match token {
                Token::Object(o) => Some(o),
                Token::And => None,
            };
            expanded.push(token.clone());
        }
        Self { tokens: expanded }
    }
}
