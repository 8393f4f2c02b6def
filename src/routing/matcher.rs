//! Route matching logic.
//!
//! # Responsibilities
//! - Match the HTTP method (case-insensitive, or any method)
//! - Match the full request path against a compiled pattern
//! - Extract named captures for the handler
//!
//! # Design Decisions
//! - Method matching is case-insensitive
//! - Patterns are anchored at both ends; a pattern must cover the whole path
//! - Captures are copied out so the match outlives the path string

use axum::http::Method;
use regex::Regex;
use std::convert::Infallible;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

use crate::http::params::{convert, ArgumentError};

/// Method a route answers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMethod {
    /// Any HTTP method.
    Any,
    /// One concrete method.
    Exact(Method),
}

impl RouteMethod {
    pub fn matches(&self, method: &Method) -> bool {
        match self {
            RouteMethod::Any => true,
            RouteMethod::Exact(expected) => expected.as_str().eq_ignore_ascii_case(method.as_str()),
        }
    }
}

impl From<Method> for RouteMethod {
    fn from(method: Method) -> Self {
        RouteMethod::Exact(method)
    }
}

/// A method token that is neither `*` nor a valid HTTP method.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid HTTP method {0:?}")]
pub struct InvalidMethod(pub String);

impl From<Infallible> for InvalidMethod {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// `*` is any method; anything else must be a valid method token.
impl TryFrom<&str> for RouteMethod {
    type Error = InvalidMethod;

    fn try_from(method: &str) -> Result<Self, Self::Error> {
        if method == "*" {
            return Ok(RouteMethod::Any);
        }
        Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map(RouteMethod::Exact)
            .map_err(|_| InvalidMethod(method.to_string()))
    }
}

impl std::fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteMethod::Any => f.write_str("*"),
            RouteMethod::Exact(method) => f.write_str(method.as_str()),
        }
    }
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

impl PathPattern {
    /// Compile a pattern. Any `^`/`$` anchors already present are harmless.
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{source})$"))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// The pattern as registered.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match the whole path, returning the named captures on success.
    pub fn captures(&self, path: &str) -> Option<RouteMatch> {
        let caps = self.regex.captures(path)?;
        let params = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();
        Some(RouteMatch {
            pattern: self.source.clone(),
            params,
        })
    }
}

/// Result of a successful route match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMatch {
    pattern: String,
    params: Vec<(String, String)>,
}

impl RouteMatch {
    /// Pattern of the matched route.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Named capture, if it participated in the match.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Required named capture.
    pub fn value(&self, name: &str) -> Result<&str, ArgumentError> {
        self.get(name).ok_or_else(|| ArgumentError::missing(name))
    }

    /// Required named capture converted to `T`.
    pub fn value_as<T>(&self, name: &str) -> Result<T, ArgumentError>
    where
        T: FromStr,
        T::Err: Display,
    {
        convert(name, self.value(name)?)
    }

    /// All captures in pattern order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
