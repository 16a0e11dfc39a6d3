// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Glob Patterns
//!
//! Shell-style wildcard matching used by substring search filters.
//!
//! | Syntax    | Matches                                         |
//! |-----------|-------------------------------------------------|
//! | `*`       | any run of characters, including none           |
//! | `?`       | exactly one character                           |
//! | `[abc]`   | one character from the set                      |
//! | `[a-z]`   | one character from the range                    |
//! | `[!a-z]`  | one character outside the set                   |
//!
//! A `]` directly after `[` (or `[!`) is a literal member of the set, as is a
//! `-` in first or last position.
//!
//! Compiled patterns are memoized process-wide; [`Glob::parse`] hands out a
//! shared [`Arc`] for each distinct pattern string. Matching backtracks only to
//! the most recent `*`, so it is linear in the pattern length times the text
//! length whatever the number of stars.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

static GLOBS: Lazy<Mutex<HashMap<String, Arc<Glob>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GlobError {
    #[error("unterminated character class in pattern '{0}'")]
    UnterminatedClass(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(char),
    Star,
    AnyOne,
    CharSet { chars: BTreeSet<char>, negate: bool },
}

impl Segment {
    /// Whether a single-character segment accepts `c`. Never true for `Star`.
    fn accepts(&self, c: char) -> bool {
        match self {
            Segment::Literal(literal) => *literal == c,
            Segment::AnyOne => true,
            Segment::CharSet { chars, negate } => chars.contains(&c) != *negate,
            Segment::Star => false,
        }
    }
}

/// A compiled glob pattern.
#[derive(Debug, PartialEq, Eq)]
pub struct Glob {
    pattern: String,
    segments: Vec<Segment>,
}

impl Glob {
    /// Compile `pattern`, reusing a previously compiled instance when available.
    pub fn parse(pattern: &str) -> Result<Arc<Glob>, GlobError> {
        let mut globs = GLOBS.lock();
        if let Some(glob) = globs.get(pattern) {
            return Ok(glob.clone());
        }
        let glob = Arc::new(Self::compile(pattern)?);
        globs.insert(pattern.to_string(), glob.clone());
        Ok(glob)
    }

    fn compile(pattern: &str) -> Result<Self, GlobError> {
        let chars: Vec<char> = pattern.chars().collect();
        let mut segments = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                // Adjacent stars are equivalent to one.
                '*' if segments.last() == Some(&Segment::Star) => i += 1,
                '*' => {
                    segments.push(Segment::Star);
                    i += 1;
                }
                '?' => {
                    segments.push(Segment::AnyOne);
                    i += 1;
                }
                '[' => {
                    let (segment, next) = parse_char_set(&chars, i + 1)
                        .ok_or_else(|| GlobError::UnterminatedClass(pattern.to_string()))?;
                    segments.push(segment);
                    i = next;
                }
                c => {
                    segments.push(Segment::Literal(c));
                    i += 1;
                }
            }
        }

        Ok(Self { pattern: pattern.to_string(), segments })
    }

    /// `true` if the whole of `text` matches the pattern.
    pub fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().collect();
        let segments = &self.segments;
        let (mut p, mut t) = (0, 0);
        // Segment after the last star seen and the text position it was tried at.
        let mut resume: Option<(usize, usize)> = None;

        while t < text.len() {
            match segments.get(p) {
                Some(Segment::Star) => {
                    p += 1;
                    resume = Some((p, t));
                }
                Some(segment) if segment.accepts(text[t]) => {
                    p += 1;
                    t += 1;
                }
                _ => match resume {
                    // Let the star swallow one more character and retry.
                    Some((after_star, tried)) => {
                        p = after_star;
                        t = tried + 1;
                        resume = Some((after_star, t));
                    }
                    None => return false,
                },
            }
        }
        segments[p.min(segments.len())..].iter().all(|segment| *segment == Segment::Star)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Display for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Parse the body of a `[...]` class starting just after the `[`.
/// Returns the segment and the index following the closing `]`.
fn parse_char_set(chars: &[char], mut i: usize) -> Option<(Segment, usize)> {
    let mut set = BTreeSet::new();
    let mut negate = false;
    if chars.get(i) == Some(&'!') {
        negate = true;
        i += 1;
    }

    let mut first = true;
    let mut previous = *chars.get(i)?;
    loop {
        let c = *chars.get(i)?;
        if !first && c == ']' {
            return Some((Segment::CharSet { chars: set, negate }, i + 1));
        }
        if !first && c == '-' {
            i += 1;
            let upper = *chars.get(i)?;
            if upper == ']' {
                set.insert('-');
                return Some((Segment::CharSet { chars: set, negate }, i + 1));
            }
            // The range start was already added when it was read.
            let start = (previous as u32).saturating_add(1);
            set.extend((start..=upper as u32).filter_map(char::from_u32));
            previous = upper;
        } else {
            set.insert(c);
            previous = c;
        }
        i += 1;
        first = false;
    }
}
