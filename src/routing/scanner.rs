//! Route discovery from handler-bearing resources.
//!
//! A `Resource` lists its routes as `RouteDescriptor`s. Resources reach the
//! scanner either by explicit `Server::add_resource` calls or, when
//! auto-loading is on, through link-time registration:
//!
//! ```ignore
//! inventory::submit! {
//!     AutoResource::new("greeting", || Arc::new(Greeting))
//! }
//! ```

use axum::http::Method;
use std::sync::Arc;

use crate::http::context::RequestContext;
use crate::routing::matcher::{InvalidMethod, RouteMatch, RouteMethod};
use crate::routing::router::{HandlerResult, Invoker, RouteError, RouteTable};

/// An object exposing a declarative list of routes.
pub trait Resource: Send + Sync + 'static {
    /// Routes served by this resource, in the order they should be tried.
    fn routes(self: Arc<Self>) -> Vec<RouteDescriptor>;
}

/// `(method, pattern, invoker)` triple plus an optional priority.
///
/// An unparsable method is kept as an error so the scanner can report and skip the route.
#[derive(Clone)]
pub struct RouteDescriptor {
    pub method: Result<RouteMethod, InvalidMethod>,
    pub pattern: String,
    pub priority: i32,
    pub invoker: Invoker,
}

impl RouteDescriptor {
    pub fn new<M, F>(method: M, pattern: impl Into<String>, handler: F) -> Self
    where
        M: TryInto<RouteMethod>,
        M::Error: Into<InvalidMethod>,
        F: Fn(&mut RequestContext, &RouteMatch) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            method: method.try_into().map_err(Into::into),
            pattern: pattern.into(),
            priority: 0,
            invoker: Arc::new(handler),
        }
    }

    pub fn get<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut RequestContext, &RouteMatch) -> HandlerResult + Send + Sync + 'static,
    {
        Self::new(Method::GET, pattern, handler)
    }

    pub fn post<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut RequestContext, &RouteMatch) -> HandlerResult + Send + Sync + 'static,
    {
        Self::new(Method::POST, pattern, handler)
    }

    pub fn any<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut RequestContext, &RouteMatch) -> HandlerResult + Send + Sync + 'static,
    {
        Self::new(RouteMethod::Any, pattern, handler)
    }

    /// Bind a method of `target` as the handler.
    pub fn bound<M, T>(
        method: M,
        pattern: impl Into<String>,
        target: &Arc<T>,
        handler: fn(&T, &mut RequestContext, &RouteMatch) -> HandlerResult,
    ) -> Self
    where
        M: TryInto<RouteMethod>,
        M::Error: Into<InvalidMethod>,
        T: Send + Sync + 'static,
    {
        let target = Arc::clone(target);
        Self::new(method, pattern, move |ctx: &mut RequestContext, m: &RouteMatch| {
            handler(&target, ctx, m)
        })
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl std::fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("priority", &self.priority)
            .finish()
    }
}

/// A resource registered at link time with `inventory::submit!`.
pub struct AutoResource {
    pub name: &'static str,
    pub build: fn() -> Arc<dyn Resource>,
}

impl AutoResource {
    pub const fn new(name: &'static str, build: fn() -> Arc<dyn Resource>) -> Self {
        Self { name, build }
    }
}

inventory::collect!(AutoResource);

/// Collects route descriptors from resources.
#[derive(Debug, Clone, Copy)]
pub struct RouteScanner {
    auto_load: bool,
}

impl RouteScanner {
    pub fn new(auto_load: bool) -> Self {
        Self { auto_load }
    }

    /// Manual resources first (insertion order), then auto-registered ones by name.
    pub fn scan(&self, manual: &[Arc<dyn Resource>]) -> Vec<RouteDescriptor> {
        let mut descriptors: Vec<RouteDescriptor> = manual
            .iter()
            .flat_map(|resource| Arc::clone(resource).routes())
            .collect();

        if self.auto_load {
            let mut registered: Vec<&AutoResource> = inventory::iter::<AutoResource>.into_iter().collect();
            registered.sort_by_key(|r| r.name);
            for auto in registered {
                let routes = (auto.build)().routes();
                tracing::debug!(resource = auto.name, routes = routes.len(), "Auto-loaded resource");
                descriptors.extend(routes);
            }
        }
        descriptors
    }

    /// Scan and add every descriptor to `table`. A descriptor whose pattern does
    /// not compile is skipped with a warning. Returns the number of routes added.
    pub fn populate(&self, table: &mut RouteTable, manual: &[Arc<dyn Resource>]) -> Result<usize, RouteError> {
        let mut added = 0;
        for descriptor in self.scan(manual) {
            let method = match descriptor.method {
                Ok(method) => method,
                Err(e) => {
                    tracing::warn!(pattern = %descriptor.pattern, error = %e, "Skipping route with invalid method");
                    continue;
                }
            };
            match table.add_with_priority(method.clone(), &descriptor.pattern, descriptor.priority, descriptor.invoker) {
                Ok(()) => added += 1,
                Err(RouteError::Sealed) => return Err(RouteError::Sealed),
                Err(e) => {
                    tracing::warn!(
                        method = %method,
                        pattern = %descriptor.pattern,
                        error = %e,
                        "Skipping route with invalid pattern"
                    );
                }
            }
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeting {
        greeting: &'static str,
    }

    impl Greeting {
        fn hello(&self, ctx: &mut RequestContext, _m: &RouteMatch) -> HandlerResult {
            ctx.response_mut().send_text(self.greeting)?;
            Ok(())
        }
    }

    impl Resource for Greeting {
        fn routes(self: Arc<Self>) -> Vec<RouteDescriptor> {
            vec![
                RouteDescriptor::bound(Method::GET, "^/test/hello$", &self, Greeting::hello),
                RouteDescriptor::get("^/broken/($", |_ctx: &mut RequestContext, _m: &RouteMatch| Ok(())),
                RouteDescriptor::any("^/test/any$", |_ctx: &mut RequestContext, _m: &RouteMatch| Ok(())),
                RouteDescriptor::new("GE T", "^/test/typo$", |_ctx: &mut RequestContext, _m: &RouteMatch| Ok(())),
                RouteDescriptor::new("", "^/test/blank$", |_ctx: &mut RequestContext, _m: &RouteMatch| Ok(())),
            ]
        }
    }

    struct Registered;

    impl Resource for Registered {
        fn routes(self: Arc<Self>) -> Vec<RouteDescriptor> {
            vec![RouteDescriptor::get("^/scanner-auto$", |_ctx: &mut RequestContext, _m: &RouteMatch| Ok(()))]
        }
    }

    inventory::submit! {
        AutoResource::new("scanner-test", || Arc::new(Registered))
    }

    fn manual() -> Vec<Arc<dyn Resource>> {
        vec![Arc::new(Greeting { greeting: "hello, world" })]
    }

    #[test]
    fn manual_routes_in_declared_order() {
        let descriptors = RouteScanner::new(false).scan(&manual());
        let patterns: Vec<_> = descriptors.iter().map(|d| d.pattern.as_str()).collect();
        assert_eq!(
            patterns,
            vec!["^/test/hello$", "^/broken/($", "^/test/any$", "^/test/typo$", "^/test/blank$"]
        );
    }

    #[test]
    fn auto_load_toggle() {
        let without = RouteScanner::new(false).scan(&[]);
        assert!(without.is_empty());

        let with = RouteScanner::new(true).scan(&[]);
        assert!(with.iter().any(|d| d.pattern == "^/scanner-auto$"));
    }

    #[test]
    fn populate_skips_bad_methods() {
        let mut table = RouteTable::new();
        RouteScanner::new(false).populate(&mut table, &manual()).unwrap();
        for method in [Method::GET, Method::DELETE] {
            assert!(table.resolve(&method, "/test/typo").is_none());
            assert!(table.resolve(&method, "/test/blank").is_none());
        }
    }

    #[test]
    fn populate_skips_bad_patterns() {
        let mut table = RouteTable::new();
        let added = RouteScanner::new(false).populate(&mut table, &manual()).unwrap();
        assert_eq!(added, 2);
        assert!(table.resolve(&Method::GET, "/test/hello").is_some());
        assert!(table.resolve(&Method::DELETE, "/test/any").is_some());
    }

    #[test]
    fn method_from_str() {
        assert_eq!(RouteMethod::try_from("get"), Ok(RouteMethod::Exact(Method::GET)));
        assert_eq!(RouteMethod::try_from("*"), Ok(RouteMethod::Any));
        assert_eq!(RouteMethod::try_from("GE T"), Err(InvalidMethod("GE T".into())));
        assert_eq!(RouteMethod::try_from(""), Err(InvalidMethod(String::new())));
    }
}
