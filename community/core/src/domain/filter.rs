// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Attribute Search Filters
//!
//! Parser and evaluator for RFC-2254 style boolean filters over [`Attributes`].
//!
//! ```text
//! filter     := "(" filtercomp ")"
//! filtercomp := "&" filter+ | "|" filter+ | "!" filter | item
//! item       := attr "=" value | attr "~=" value | attr "<=" value | attr ">=" value
//! ```
//!
//! For `=`, a value containing `*` is a glob match (a lone `*` tests presence),
//! anything else is exact equality. Multi-valued attributes match when any value
//! matches. Attributes that are absent never match, so `(!(x=1))` is true for an
//! entity without `x`.
//!
//! `<=` and `>=` compare each value lexicographically against the filter value.
//! Extensible matching (`attr:=...`) is not supported.

use super::attributes::Attributes;
use super::glob::{Glob, GlobError};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

const SEPARATORS: [char; 5] = ['(', ')', '&', '|', '!'];

/// Why a filter string could not be parsed. Every variant that stems from a
/// concrete token carries it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterParseError {
    #[error("premature end of filter")]
    PrematureEnd,

    #[error("'{expected}' missing, found '{found}'")]
    Missing { expected: char, found: String },

    #[error("'{0}' unexpected")]
    Unexpected(String),

    #[error("filter type missing in '{0}'")]
    FilterTypeMissing(String),

    #[error("matching rules not supported in '{0}'")]
    MatchingRuleUnsupported(String),

    #[error("invalid pattern in '{token}': {source}")]
    InvalidGlob {
        token: String,
        #[source]
        source: GlobError,
    },
}

impl FilterParseError {
    /// The token the parser choked on, if any.
    pub fn token(&self) -> Option<&str> {
        match self {
            FilterParseError::PrematureEnd => None,
            FilterParseError::Missing { found, .. } => Some(found),
            FilterParseError::Unexpected(token)
            | FilterParseError::FilterTypeMissing(token)
            | FilterParseError::MatchingRuleUnsupported(token)
            | FilterParseError::InvalidGlob { token, .. } => Some(token),
        }
    }
}

/// A parsed search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality { attr: String, value: String },
    Approximate { attr: String, value: String },
    LessOrEqual { attr: String, value: String },
    GreaterOrEqual { attr: String, value: String },
    Presence { attr: String },
    Substring { attr: String, glob: Arc<Glob> },
}

impl Filter {
    /// Parse a filter string such as `(&(Role=Member)(Color=b*))`.
    pub fn parse(input: &str) -> Result<Filter, FilterParseError> {
        Parser::new(input).filter()
    }

    /// Evaluate the filter against an attribute set.
    pub fn matches(&self, attributes: &Attributes) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(attributes)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(attributes)),
            Filter::Not(filter) => !filter.matches(attributes),
            Filter::Equality { attr, value } | Filter::Approximate { attr, value } => {
                attributes.contains_value(attr, value)
            }
            Filter::LessOrEqual { attr, value } => any_value(attributes, attr, |v| v <= value.as_str()),
            Filter::GreaterOrEqual { attr, value } => any_value(attributes, attr, |v| v >= value.as_str()),
            Filter::Presence { attr } => attributes.contains_id(attr),
            Filter::Substring { attr, glob } => any_value(attributes, attr, |v| glob.matches(v)),
        }
    }
}

fn any_value(attributes: &Attributes, attr: &str, predicate: impl Fn(&str) -> bool) -> bool {
    attributes
        .get(attr)
        .is_some_and(|values| values.iter().any(|v| predicate(v.as_str())))
}

impl FromStr for Filter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Filter::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(filters) => write_list(f, '&', filters),
            Filter::Or(filters) => write_list(f, '|', filters),
            Filter::Not(filter) => write!(f, "(!{})", filter),
            Filter::Equality { attr, value } => write!(f, "({}={})", attr, value),
            Filter::Approximate { attr, value } => write!(f, "({}~={})", attr, value),
            Filter::LessOrEqual { attr, value } => write!(f, "({}<={})", attr, value),
            Filter::GreaterOrEqual { attr, value } => write!(f, "({}>={})", attr, value),
            Filter::Presence { attr } => write!(f, "({}=*)", attr),
            Filter::Substring { attr, glob } => write!(f, "({}={})", attr, glob),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, op: char, filters: &[Filter]) -> fmt::Result {
    write!(f, "({}", op)?;
    for filter in filters {
        write!(f, "{}", filter)?;
    }
    write!(f, ")")
}

/// Split on the structural characters, keeping them as tokens and dropping
/// whitespace-only fragments.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in input.chars() {
        if SEPARATORS.contains(&c) {
            if !current.trim().is_empty() {
                tokens.push(current.trim().to_string());
            }
            current.clear();
            tokens.push(c.to_string());
        } else {
            current.push(c);
        }
    }
    if !current.trim().is_empty() {
        tokens.push(current.trim().to_string());
    }
    tokens
}

struct Parser {
    tokens: Vec<String>,
    position: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self { tokens: tokenize(input), position: 0 }
    }

    fn next_token(&mut self) -> Result<String, FilterParseError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or(FilterParseError::PrematureEnd)?;
        self.position += 1;
        Ok(token)
    }

    fn peek_token(&self) -> Result<&str, FilterParseError> {
        self.tokens
            .get(self.position)
            .map(String::as_str)
            .ok_or(FilterParseError::PrematureEnd)
    }

    fn expect(&mut self, expected: char) -> Result<(), FilterParseError> {
        let token = self.next_token()?;
        if token.len() == 1 && token.starts_with(expected) {
            Ok(())
        } else {
            Err(FilterParseError::Missing { expected, found: token })
        }
    }

    fn filter(&mut self) -> Result<Filter, FilterParseError> {
        self.expect('(')?;
        let filter = self.filter_comp()?;
        self.expect(')')?;
        Ok(filter)
    }

    fn filter_comp(&mut self) -> Result<Filter, FilterParseError> {
        let token = self.next_token()?;
        match token.as_str() {
            "&" => Ok(Filter::And(self.filter_list()?)),
            "|" => Ok(Filter::Or(self.filter_list()?)),
            "!" => Ok(Filter::Not(Box::new(self.filter()?))),
            "(" | ")" => Err(FilterParseError::Unexpected(token)),
            _ => item(token),
        }
    }

    fn filter_list(&mut self) -> Result<Vec<Filter>, FilterParseError> {
        let mut filters = vec![self.filter()?];
        while self.peek_token()? == "(" {
            filters.push(self.filter()?);
        }
        Ok(filters)
    }
}

fn item(token: String) -> Result<Filter, FilterParseError> {
    let eq = match token.find('=') {
        Some(eq) if eq > 0 => eq,
        _ => return Err(FilterParseError::FilterTypeMissing(token)),
    };
    let value = token[eq + 1..].to_string();
    let head = &token[..eq];

    let (attr, operator) = match head.chars().last() {
        Some(op @ ('<' | '>' | '~' | ':')) => (head[..head.len() - 1].trim_end(), Some(op)),
        _ => (head.trim_end(), None),
    };
    if attr.is_empty() {
        return Err(FilterParseError::FilterTypeMissing(token));
    }
    let attr = attr.to_string();

    match operator {
        Some('<') => Ok(Filter::LessOrEqual { attr, value }),
        Some('>') => Ok(Filter::GreaterOrEqual { attr, value }),
        Some('~') => Ok(Filter::Approximate { attr, value }),
        Some(_) => Err(FilterParseError::MatchingRuleUnsupported(token)),
        None if !value.contains('*') => Ok(Filter::Equality { attr, value }),
        None if value == "*" => Ok(Filter::Presence { attr }),
        None => match Glob::parse(&value) {
            Ok(glob) => Ok(Filter::Substring { attr, glob }),
            Err(source) => Err(FilterParseError::InvalidGlob { token, source }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member() -> Attributes {
        Attributes::new()
            .with("Role", "Member")
            .with("Role", "Observer")
            .with("EntityType", "Agent")
            .with("Level", "5")
    }

    fn matches(filter: &str, attrs: &Attributes) -> bool {
        Filter::parse(filter).unwrap().matches(attrs)
    }

    #[test]
    fn test_equality_matches_any_value() {
        let attrs = member();
        assert!(matches("(Role=Member)", &attrs));
        assert!(matches("(Role=Observer)", &attrs));
        assert!(!matches("(Role=Manager)", &attrs));
        assert!(matches("(Role~=Member)", &attrs));
    }

    #[test]
    fn test_unknown_attribute_never_matches() {
        let attrs = member();
        assert!(!matches("(Color=red)", &attrs));
        assert!(!matches("(Color=*)", &attrs));
        assert!(!matches("(Color<=z)", &attrs));
        assert!(matches("(!(Color=red))", &attrs));
    }

    #[test]
    fn test_boolean_composition() {
        let attrs = member();
        assert!(matches("(&(Role=Member)(EntityType=Agent))", &attrs));
        assert!(!matches("(&(Role=Member)(EntityType=Community))", &attrs));
        assert!(matches("(|(Role=Manager)(EntityType=Agent))", &attrs));
        assert!(matches("(&(|(Role=x)(Role=Member))(!(Level=6)))", &attrs));
    }

    #[test]
    fn test_presence_and_substring() {
        let attrs = member();
        assert!(matches("(Role=*)", &attrs));
        assert!(matches("(Role=Mem*)", &attrs));
        assert!(matches("(Role=*serv*)", &attrs));
        assert!(!matches("(Role=Man*)", &attrs));
    }

    #[test]
    fn test_ordering_comparisons() {
        let attrs = member();
        assert!(matches("(Level<=5)", &attrs));
        assert!(matches("(Level<=7)", &attrs));
        assert!(!matches("(Level<=4)", &attrs));
        assert!(matches("(Level>=3)", &attrs));
        assert!(!matches("(Level>=6)", &attrs));
    }

    #[test]
    fn test_whitespace_is_tolerated() {
        let attrs = member();
        assert!(matches("( & (Role=Member) (EntityType=Agent) )", &attrs));
        assert!(matches("(&\t(Role=Member)\n(Level=5))", &attrs));
    }

    #[test]
    fn test_display_renders_canonical_form() {
        let text = "(&(Role=Member)(|(Level<=5)(Level>=9))(!(Color=*))(Name=a*z)(Kind~=x))";
        let filter = Filter::parse(text).unwrap();
        assert_eq!(filter.to_string(), text);
        assert_eq!(Filter::parse(&filter.to_string()).unwrap(), filter);
    }

    #[test]
    fn test_parse_errors_carry_offending_token() {
        assert_eq!(Filter::parse("(Role=Member").unwrap_err(), FilterParseError::PrematureEnd);
        assert_eq!(
            Filter::parse("Role=Member)").unwrap_err(),
            FilterParseError::Missing { expected: '(', found: "Role=Member".to_string() }
        );
        assert_eq!(
            Filter::parse("(Role)").unwrap_err(),
            FilterParseError::FilterTypeMissing("Role".to_string())
        );
        assert_eq!(
            Filter::parse("(=x)").unwrap_err(),
            FilterParseError::FilterTypeMissing("=x".to_string())
        );
        assert_eq!(Filter::parse("(()").unwrap_err().token(), Some("("));

        let rule = Filter::parse("(cn:dn:=John)").unwrap_err();
        assert!(matches!(rule, FilterParseError::MatchingRuleUnsupported(_)));
        assert_eq!(rule.token(), Some("cn:dn:=John"));

        let glob = Filter::parse("(Name=a*[bc)").unwrap_err();
        assert!(matches!(glob, FilterParseError::InvalidGlob { .. }));
    }

    #[test]
    fn test_from_str() {
        let filter: Filter = "(Role=Member)".parse().unwrap();
        assert_eq!(
            filter,
            Filter::Equality { attr: "Role".to_string(), value: "Member".to_string() }
        );
    }
}
