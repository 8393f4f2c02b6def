//! Route table and lookup.
//!
//! # Responsibilities
//! - Store compiled routes in a reproducible order
//! - Look up the first route matching a request
//! - Return the matched route or an explicit no-match
//!
//! # Design Decisions
//! - Routes are sorted once by priority (higher first), ties keep registration order
//! - Sealed tables are immutable; clones share the same entries
//! - O(n) scan; route counts are small next to network I/O
//! - Explicit `None` rather than a silent default route

use axum::http::Method;
use std::sync::Arc;
use thiserror::Error;

use crate::http::context::RequestContext;
use crate::routing::matcher::{InvalidMethod, PathPattern, RouteMatch, RouteMethod};

/// Error returned by a handler. Any error type converts into it with `?`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a handler invocation.
pub type HandlerResult = Result<(), HandlerError>;

/// A callable route handler.
pub type Invoker = Arc<dyn Fn(&mut RequestContext, &RouteMatch) -> HandlerResult + Send + Sync>;

/// Wrap a closure or function as an `Invoker`.
pub fn invoker<F>(handler: F) -> Invoker
where
    F: Fn(&mut RequestContext, &RouteMatch) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// Errors raised while registering routes.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route table is sealed; routes can only be added before the first start")]
    Sealed,

    #[error("invalid route pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    InvalidMethod(#[from] InvalidMethod),
}

/// One registered route.
#[derive(Clone)]
pub struct RouteEntry {
    pub method: RouteMethod,
    pub pattern: PathPattern,
    pub priority: i32,
    pub source_order: usize,
    pub invoker: Invoker,
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field("priority", &self.priority)
            .field("source_order", &self.source_order)
            .finish()
    }
}

/// Ordered collection of routes; first match wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Arc<Vec<RouteEntry>>,
    sealed: bool,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route with the default priority.
    pub fn add(&mut self, method: RouteMethod, pattern: &str, invoker: Invoker) -> Result<(), RouteError> {
        self.add_with_priority(method, pattern, 0, invoker)
    }

    /// Append a route. Higher priorities are tried first once sealed.
    pub fn add_with_priority(
        &mut self,
        method: RouteMethod,
        pattern: &str,
        priority: i32,
        invoker: Invoker,
    ) -> Result<(), RouteError> {
        if self.sealed {
            return Err(RouteError::Sealed);
        }
        let compiled = PathPattern::new(pattern).map_err(|source| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let entries = Arc::make_mut(&mut self.entries);
        let source_order = entries.len();
        entries.push(RouteEntry {
            method,
            pattern: compiled,
            priority,
            source_order,
            invoker,
        });
        Ok(())
    }

    /// Sort by priority and freeze. Calling it again changes nothing.
    pub fn seal(&mut self) {
        if self.sealed {
            return;
        }
        // Stable sort on (priority desc, registration order asc) keeps the order total.
        Arc::make_mut(&mut self.entries)
            .sort_by(|a, b| b.priority.cmp(&a.priority).then(a.source_order.cmp(&b.source_order)));
        self.sealed = true;
        tracing::debug!(routes = self.entries.len(), "Route table sealed");
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in evaluation order.
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Find the first route whose method and pattern both match.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<(&RouteEntry, RouteMatch)> {
        self.entries
            .iter()
            .filter(|entry| entry.method.matches(method))
            .find_map(|entry| entry.pattern.captures(path).map(|m| (entry, m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(tag: &'static str) -> Invoker {
        invoker(move |ctx: &mut RequestContext, _m: &RouteMatch| -> HandlerResult {
            ctx.response_mut().send_text(tag)?;
            Ok(())
        })
    }

    fn resolved_pattern(table: &RouteTable, method: Method, path: &str) -> Option<String> {
        table
            .resolve(&method, path)
            .map(|(entry, _)| entry.pattern.as_str().to_string())
    }

    #[test]
    fn first_registered_match_wins() {
        let mut table = RouteTable::new();
        table.add(Method::GET.into(), "/a/(?<x>.+)$", tagged("capture")).unwrap();
        table.add(Method::GET.into(), "/a/fixed$", tagged("fixed")).unwrap();
        table.seal();

        let (entry, m) = table.resolve(&Method::GET, "/a/fixed").unwrap();
        assert_eq!(entry.pattern.as_str(), "/a/(?<x>.+)$");
        assert_eq!(m.get("x"), Some("fixed"));
    }

    #[test]
    fn priority_overrides_registration_order() {
        let mut table = RouteTable::new();
        table.add(Method::GET.into(), "/a/(?<x>.+)", tagged("capture")).unwrap();
        table
            .add_with_priority(Method::GET.into(), "/a/fixed", 10, tagged("fixed"))
            .unwrap();
        table.seal();

        assert_eq!(
            resolved_pattern(&table, Method::GET, "/a/fixed").as_deref(),
            Some("/a/fixed")
        );
    }

    #[test]
    fn method_filters_before_pattern() {
        let mut table = RouteTable::new();
        table.add(Method::POST.into(), "/items", tagged("post")).unwrap();
        table.add(RouteMethod::Any, "/items", tagged("any")).unwrap();
        table.seal();

        let (entry, _) = table.resolve(&Method::GET, "/items").unwrap();
        assert_eq!(entry.method, RouteMethod::Any);
        let (entry, _) = table.resolve(&Method::POST, "/items").unwrap();
        assert_eq!(entry.method, RouteMethod::Exact(Method::POST));
    }

    #[test]
    fn no_match_is_none() {
        let mut table = RouteTable::new();
        table.add(Method::GET.into(), "/only", tagged("only")).unwrap();
        table.seal();
        assert!(table.resolve(&Method::GET, "/other").is_none());
    }

    #[test]
    fn sealing_twice_keeps_order() {
        let mut table = RouteTable::new();
        for (i, pattern) in ["/x", "/y", "/z", "/(?<any>.*)"].iter().enumerate() {
            table
                .add_with_priority(Method::GET.into(), pattern, (i % 2) as i32, tagged("t"))
                .unwrap();
        }
        table.seal();
        let first: Vec<_> = table.entries().iter().map(|e| e.source_order).collect();
        table.seal();
        let second: Vec<_> = table.entries().iter().map(|e| e.source_order).collect();

        assert_eq!(first, vec![1, 3, 0, 2]);
        assert_eq!(first, second);
    }

    #[test]
    fn sealed_table_rejects_additions() {
        let mut table = RouteTable::new();
        table.seal();
        assert!(matches!(
            table.add(Method::GET.into(), "/late", tagged("late")),
            Err(RouteError::Sealed)
        ));
    }

    #[test]
    fn bad_pattern_only_fails_its_own_registration() {
        let mut table = RouteTable::new();
        assert!(matches!(
            table.add(Method::GET.into(), "/broken/(", tagged("bad")),
            Err(RouteError::InvalidPattern { .. })
        ));
        table.add(Method::GET.into(), "/fine", tagged("fine")).unwrap();
        assert_eq!(table.len(), 1);
    }
}
