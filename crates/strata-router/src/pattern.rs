//! Path pattern compilation.
//!
//! A pattern is a `/`-separated list of segments. Each segment is literal text
//! mixed with parameter tokens:
//!
//! | Token | Meaning |
//! |-------|---------|
//! | `:name` | named parameter, matches `[^/]+` |
//! | `:name{re}` | named parameter constrained by `re` |
//! | `{re}` | anonymous segment part constrained by `re` (not captured) |
//!
//! So `user_:id` is the literal `user_` followed by the parameter `id`, and
//! `v_{[0-9]+}` is the literal `v_` followed by digits. Patterns are compiled
//! once, at tree assembly, into an anchored [`Regex`].

use std::iter::Peekable;
use std::str::Chars;

use regex::Regex;

use crate::error::RouteError;
use crate::params::Params;

const DEFAULT_PARAM: &str = "[^/]+";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Param {
        name: Option<String>,
        constraint: Option<String>,
    },
}

/// A compiled path pattern.
///
/// # Example
///
/// ```rust
/// use strata_router::Pattern;
///
/// let pattern = Pattern::compile("/api/users/user_:id").unwrap();
/// let params = pattern.matches("/api/users/user_42").unwrap();
/// assert_eq!(params.get("id"), Some("42"));
/// assert!(pattern.matches("/api/users/42").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
    names: Vec<String>,
    shape: String,
    ranks: Vec<u8>,
}

impl Pattern {
    /// Compiles `source` into a matcher.
    ///
    /// The source is normalised first: a leading `/` is added, empty segments
    /// are dropped and a trailing `/` is removed.
    pub fn compile(source: &str) -> Result<Self, RouteError> {
        let segments = split_segments(source)?;

        let mut regex_src = String::from("^");
        let mut shape = String::new();
        let mut names: Vec<String> = Vec::new();
        let mut ranks = Vec::with_capacity(segments.len());

        for segment in &segments {
            let tokens = tokenize(source, segment)?;
            ranks.push(rank(&tokens));
            regex_src.push('/');
            shape.push('/');

            for token in tokens {
                match token {
                    Token::Literal(text) => {
                        regex_src.push_str(&regex::escape(&text));
                        shape.push_str(&text);
                    }
                    Token::Param { name, constraint } => {
                        let body = constraint.as_deref().unwrap_or(DEFAULT_PARAM);
                        if let Some(name) = name {
                            if names.contains(&name) {
                                return Err(RouteError::invalid(
                                    source,
                                    format!("duplicate parameter `{name}`"),
                                ));
                            }
                            regex_src.push_str(&format!("(?P<{name}>{body})"));
                            names.push(name);
                        } else {
                            regex_src.push_str(&format!("(?:{body})"));
                        }
                        shape.push_str(&format!(":{{{body}}}"));
                    }
                }
            }
        }

        if segments.is_empty() {
            regex_src.push('/');
            shape.push('/');
        }
        regex_src.push('$');

        let regex =
            Regex::new(&regex_src).map_err(|e| RouteError::invalid(source, e.to_string()))?;

        Ok(Self {
            source: format!("/{}", segments.join("/")),
            regex,
            names,
            shape,
            ranks,
        })
    }

    /// Matches a concrete request path, returning the captured parameters.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<Params> {
        let captures = self.regex.captures(path)?;
        let mut params = Params::new();
        for name in &self.names {
            if let Some(value) = captures.name(name) {
                params.push(name.clone(), value.as_str());
            }
        }
        Some(params)
    }

    /// The normalised pattern text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The pattern with parameter names erased.
    ///
    /// Two patterns with the same shape match exactly the same paths, which
    /// is what conflict detection compares.
    #[must_use]
    pub fn shape(&self) -> &str {
        &self.shape
    }

    /// Declared parameter names, in order.
    #[must_use]
    pub fn param_names(&self) -> &[String] {
        &self.names
    }

    /// Returns true if the pattern has no parameter tokens.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.ranks.iter().all(|r| *r == 0)
    }

    /// Per-segment specificity, lower is more specific.
    pub(crate) fn ranks(&self) -> &[u8] {
        &self.ranks
    }
}

/// Joins a mount prefix and a child path into one normalised path.
///
/// ```rust
/// use strata_router::join;
///
/// assert_eq!(join("/api", "users"), "/api/users");
/// assert_eq!(join("/api/", "/users/"), "/api/users");
/// assert_eq!(join("", ""), "/");
/// ```
#[must_use]
pub fn join(prefix: &str, path: &str) -> String {
    let head = prefix.trim_matches('/');
    let tail = path.trim_matches('/');
    match (head.is_empty(), tail.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{tail}"),
        (false, true) => format!("/{head}"),
        (false, false) => format!("/{head}/{tail}"),
    }
}

/// Splits on `/` outside of `{...}` constraints, dropping empty segments.
fn split_segments(source: &str) -> Result<Vec<String>, RouteError> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in source.trim().chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| RouteError::invalid(source, "unbalanced `}`"))?;
            }
            '/' if depth == 0 => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                continue;
            }
            _ => {}
        }
        current.push(c);
    }

    if depth != 0 {
        return Err(RouteError::invalid(source, "unbalanced `{`"));
    }
    if !current.is_empty() {
        segments.push(current);
    }
    Ok(segments)
}

fn tokenize(source: &str, segment: &str) -> Result<Vec<Token>, RouteError> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = segment.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ':' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    return Err(RouteError::invalid(source, "empty parameter name"));
                }
                if name.starts_with(|c: char| c.is_ascii_digit()) {
                    return Err(RouteError::invalid(
                        source,
                        format!("parameter `{name}` must not start with a digit"),
                    ));
                }
                let constraint = if chars.peek() == Some(&'{') {
                    chars.next();
                    Some(read_constraint(source, &mut chars)?)
                } else {
                    None
                };
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Param {
                    name: Some(name),
                    constraint,
                });
            }
            '{' => {
                let constraint = read_constraint(source, &mut chars)?;
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Param {
                    name: None,
                    constraint: Some(constraint),
                });
            }
            '}' => return Err(RouteError::invalid(source, "unbalanced `}`")),
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    Ok(tokens)
}

/// Reads a constraint body after its opening brace, honouring nested braces
/// such as `{[0-9]{2,4}}`.
fn read_constraint(source: &str, chars: &mut Peekable<Chars<'_>>) -> Result<String, RouteError> {
    let mut depth = 1usize;
    let mut body = String::new();

    for c in chars.by_ref() {
        if c == '{' {
            depth += 1;
        } else if c == '}' {
            depth -= 1;
            if depth == 0 {
                if body.is_empty() {
                    return Err(RouteError::invalid(source, "empty constraint `{}`"));
                }
                return Ok(body);
            }
        }
        body.push(c);
    }

    Err(RouteError::invalid(source, "unbalanced `{`"))
}

fn rank(tokens: &[Token]) -> u8 {
    let literal = tokens.iter().any(|t| matches!(t, Token::Literal(_)));
    let param = tokens.iter().find_map(|t| match t {
        Token::Param { constraint, .. } => Some(constraint.is_some()),
        Token::Literal(_) => None,
    });
    match (literal, param) {
        (_, None) => 0,
        (true, Some(_)) => 1,
        (false, Some(true)) => 2,
        (false, Some(false)) => 3,
    }
}
