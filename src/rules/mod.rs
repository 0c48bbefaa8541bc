//! Rule matchers: the two shapes a [`Rule`] or a source's drop filter can
//! take. Compilation (regex compilation, query tokenization) happens once
//! at source load and is memoized on the [`Matcher`] value itself, never
//! repeated per event.

use crate::event::{LogEvent, SourceToken};
use regex::Regex;

/// A compiled matcher: either a tokenized query-language expression or a
/// compiled regular expression over the event's `event_message` field.
#[derive(Debug, Clone)]
pub enum Matcher {
    Query(QueryExpr),
    Regex(RegexMatcher),
}

impl Matcher {
    pub fn compile_query(source: &str) -> Self {
        Matcher::Query(QueryExpr::parse(source))
    }

    pub fn compile_regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Matcher::Regex(RegexMatcher {
            pattern: pattern.to_string(),
            regex: Regex::new(pattern)?,
        }))
    }

    pub fn is_match(&self, event: &LogEvent) -> bool {
        let message = event.event_message().unwrap_or_default();
        match self {
            Matcher::Query(expr) => expr.is_match(message),
            Matcher::Regex(r) => r.regex.is_match(message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegexMatcher {
    pub pattern: String,
    regex: Regex,
}

/// A minimal compiled query-language expression: whitespace-separated
/// terms, implicitly ANDed, `"quoted phrase"` for exact substrings, and a
/// leading `-` to negate a term. This is intentionally small — it exists
/// to give [`Matcher::Query`] real match semantics, not to be a complete
/// log query language.
#[derive(Debug, Clone)]
pub struct QueryExpr {
    source: String,
    terms: Vec<Term>,
}

#[derive(Debug, Clone)]
struct Term {
    text: String,
    negate: bool,
}

impl QueryExpr {
    pub fn parse(source: &str) -> Self {
        let mut terms = Vec::new();
        let mut chars = source.trim().chars().peekable();
        let mut buf = String::new();
        let mut in_quotes = false;

        let mut push_buf = |buf: &mut String, terms: &mut Vec<Term>| {
            if buf.is_empty() {
                return;
            }
            let negate = buf.starts_with('-');
            let text = if negate { buf[1..].to_string() } else { buf.clone() };
            if !text.is_empty() {
                terms.push(Term {
                    text: text.to_lowercase(),
                    negate,
                });
            }
            buf.clear();
        };

        while let Some(c) = chars.next() {
            match c {
                '"' => {
                    if in_quotes {
                        push_buf(&mut buf, &mut terms);
                    }
                    in_quotes = !in_quotes;
                }
                c if c.is_whitespace() && !in_quotes => push_buf(&mut buf, &mut terms),
                c => buf.push(c),
            }
        }
        push_buf(&mut buf, &mut terms);

        Self {
            source: source.to_string(),
            terms,
        }
    }

    pub fn is_match(&self, message: &str) -> bool {
        if self.terms.is_empty() {
            return false;
        }
        let haystack = message.to_lowercase();
        self.terms.iter().all(|term| {
            let contains = haystack.contains(&term.text);
            if term.negate {
                !contains
            } else {
                contains
            }
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// A routing rule: a compiled matcher plus the token of the sink source
/// events are re-ingested into on a match. Routing depth is bounded to one
/// hop: the sink ingest runs with rule evaluation disabled.
#[derive(Debug, Clone)]
pub struct Rule {
    pub matcher: Matcher,
    pub sink_token: SourceToken,
}

impl Rule {
    pub fn new(matcher: Matcher, sink_token: SourceToken) -> Self {
        Self { matcher, sink_token }
    }

    pub fn is_match(&self, event: &LogEvent) -> bool {
        self.matcher.is_match(event)
    }
}
