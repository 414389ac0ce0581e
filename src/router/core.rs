//! Route table and resolution.
//!
//! Routes are kept in registration order and resolved by linear scan; the
//! first route whose pattern matches wins. Registering a template whose
//! compiled pattern already exists merges the method table into that route
//! instead of adding a second one.

use super::pattern::{compile, CompiledPath, ParamError, PathParams, PatternError};
use crate::dispatcher::Handler;
use crate::server::Method;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// A compiled path plus its per-method handler table.
#[derive(Debug, Clone)]
pub struct Route {
    template: String,
    compiled: CompiledPath,
    methods: BTreeMap<Method, Handler>,
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.compiled.pattern() == other.compiled.pattern()
    }
}

impl Route {
    pub fn new(method: Method, template: &str, handler: Handler) -> Result<Self, PatternError> {
        let compiled = compile(template)?;
        let mut methods = BTreeMap::new();
        methods.insert(method, handler);
        Ok(Self {
            template: template.to_string(),
            compiled,
            methods,
        })
    }

    /// The template as first registered, e.g. `/api/manga/<id:int>`.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The compiled regex source; route identity.
    pub fn pattern(&self) -> &str {
        self.compiled.pattern()
    }

    pub fn has_path_params(&self) -> bool {
        self.compiled.has_params()
    }

    pub fn matches(&self, path: &str) -> bool {
        self.compiled.is_match(path)
    }

    pub fn get_params(&self, path: &str) -> Result<PathParams, ParamError> {
        self.compiled.extract(path)
    }

    pub fn handler(&self, method: Method) -> Option<&Handler> {
        self.methods.get(&method)
    }

    pub fn methods(&self) -> impl Iterator<Item = (Method, &Handler)> {
        self.methods.iter().map(|(m, h)| (*m, h))
    }

    fn merge(&mut self, other: Route) {
        for (method, handler) in other.methods {
            if let Some(previous) = self.methods.insert(method, handler) {
                warn!(
                    method = %method,
                    template = %self.template,
                    replaced = %previous.name(),
                    "Handler replaced on re-registration"
                );
            }
        }
    }
}

/// Outcome of resolving a method and path.
#[derive(Debug)]
pub enum Resolution<'a> {
    Matched { route: &'a Route, handler: &'a Handler },
    /// A route matched the path but has no handler for the method (405).
    MethodNotAllowed { route: &'a Route },
    /// No route matched the path (404).
    NotFound,
}

/// One entry of a handler group's registration table.
#[derive(Debug, Clone)]
pub struct RouteDef {
    pub method: Method,
    pub path: &'static str,
    pub handler: Handler,
}

impl RouteDef {
    pub fn new(method: Method, path: &'static str, handler: Handler) -> Self {
        Self {
            method,
            path,
            handler,
        }
    }

    pub fn get(path: &'static str, handler: Handler) -> Self {
        Self::new(Method::Get, path, handler)
    }

    pub fn post(path: &'static str, handler: Handler) -> Self {
        Self::new(Method::Post, path, handler)
    }

    pub fn put(path: &'static str, handler: Handler) -> Self {
        Self::new(Method::Put, path, handler)
    }

    pub fn delete(path: &'static str, handler: Handler) -> Self {
        Self::new(Method::Delete, path, handler)
    }
}

/// A set of related routes sharing a base path.
///
/// Implementors list their routes explicitly; nothing is discovered at
/// runtime.
pub trait HandlerGroup {
    /// Prefix prepended to every path in [`HandlerGroup::routes`].
    fn base_path(&self) -> &str;

    fn routes(self: Rc<Self>) -> Vec<RouteDef>;
}

/// Ordered route table.
#[derive(Debug, Default, Clone)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method` on `template`.
    pub fn add_route(
        &mut self,
        method: Method,
        template: &str,
        handler: Handler,
    ) -> Result<(), PatternError> {
        let route = Route::new(method, template, handler)?;
        self.insert(route);
        Ok(())
    }

    fn insert(&mut self, route: Route) {
        if let Some(existing) = self.routes.iter_mut().find(|r| **r == route) {
            existing.merge(route);
        } else {
            debug!(template = %route.template, pattern = %route.pattern(), "Route registered");
            self.routes.push(route);
        }
    }

    /// Register every route of a handler group under its base path.
    pub fn mount<G: HandlerGroup + ?Sized>(&mut self, group: Rc<G>) -> Result<(), PatternError> {
        let base = group.base_path().to_string();
        let defs = group.routes();
        let count = defs.len();
        for def in defs {
            self.add_route(def.method, &format!("{base}{}", def.path), def.handler)?;
        }
        info!(base_path = %base, routes = count, "Handler group mounted");
        Ok(())
    }

    /// First route, in registration order, whose pattern matches `path`.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(path))
    }

    /// Resolve the path, then the method on the matched route.
    pub fn resolve_method(&self, method: Method, path: &str) -> Resolution<'_> {
        match self.resolve(path) {
            None => Resolution::NotFound,
            Some(route) => match route.handler(method) {
                Some(handler) => Resolution::Matched { route, handler },
                None => Resolution::MethodNotAllowed { route },
            },
        }
    }

    pub fn get_params(&self, route: &Route, path: &str) -> Result<PathParams, ParamError> {
        route.get_params(path)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// One line per route and method, in registration order.
    pub fn describe(&self) -> Vec<String> {
        self.routes
            .iter()
            .flat_map(|route| {
                route.methods().map(move |(method, handler)| {
                    format!("{method:<6} {} -> {}", route.template(), handler.name())
                })
            })
            .collect()
    }
}
