//! Route table
//!
//! Registration API (verbs, groups, resource controllers) and `dispatch`,
//! which picks the effective verb, finds the first matching route and hands
//! it to the dispatch boundary.

use hyper::Method;

use super::matcher::{match_route, Route};
use super::pattern::{join, CompiledPattern};
use crate::container::Container;
use crate::dispatch::{self, action, Handler, ResourceController};
use crate::error::RouteError;
use crate::http::{Request, Response};
use crate::logger;

/// Ordered route table
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
    /// Prefix of the group currently being registered
    prefix: String,
    debug: bool,
}

type Registration<'a> = Result<&'a mut Router, RouteError>;

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include error details in 500 responses
    pub fn set_debug(&mut self, debug: bool) -> &mut Self {
        self.debug = debug;
        self
    }


    /// Register `handler` for `method` on `pattern`, under the current group prefix
    pub fn add(&mut self, method: Method, pattern: &str, handler: Handler) -> Registration<'_> {
        let full = join(&self.prefix, pattern);
        let compiled = CompiledPattern::compile(&full)?;
        self.routes.push(Route::new(method, compiled, handler));
        Ok(self)
    }

    pub fn get(&mut self, pattern: &str, handler: Handler) -> Registration<'_> {
        self.add(Method::GET, pattern, handler)
    }

    pub fn post(&mut self, pattern: &str, handler: Handler) -> Registration<'_> {
        self.add(Method::POST, pattern, handler)
    }

    pub fn put(&mut self, pattern: &str, handler: Handler) -> Registration<'_> {
        self.add(Method::PUT, pattern, handler)
    }

    pub fn delete(&mut self, pattern: &str, handler: Handler) -> Registration<'_> {
        self.add(Method::DELETE, pattern, handler)
    }

    pub fn patch(&mut self, pattern: &str, handler: Handler) -> Registration<'_> {
        self.add(Method::PATCH, pattern, handler)
    }

    /// Register routes under `prefix`; groups nest
    pub fn group<F>(&mut self, prefix: &str, routes: F) -> Registration<'_>
    where
        F: FnOnce(&mut Self) -> Result<(), RouteError>,
    {
        let outer = std::mem::take(&mut self.prefix);
        self.prefix = join(&outer, prefix);
        let result = routes(self);
        self.prefix = outer;
        result.map(|()| self)
    }

    /// Conventional CRUD routes for controller `C` under `base`.
    ///
    /// `criar` comes before `{id}` so it is not captured as an id. POST
    /// aliases `{id}/atualizar` and `{id}/deletar` serve forms
    /// that cannot send `_method`.
    pub fn resource<C: ResourceController>(&mut self, base: &str) -> Registration<'_> {
        let member = join(base, "{id}");
        self.get(base, action::<C, _>("index", C::index))?
            .get(&join(base, "criar"), action::<C, _>("create", C::create))?
            .post(base, action::<C, _>("store", C::store))?
            .get(&member, action::<C, _>("show", C::show))?
            .get(&join(&member, "editar"), action::<C, _>("edit", C::edit))?
            .put(&member, action::<C, _>("update", C::update))?
            .delete(&member, action::<C, _>("destroy", C::destroy))?
            .post(&join(&member, "atualizar"), action::<C, _>("update", C::update))?
            .post(&join(&member, "deletar"), action::<C, _>("destroy", C::destroy))
    }

    /// Registered routes, in registration order
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// One line per route, for the startup log
    pub fn describe(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|route| {
                format!(
                    "{:<7} {:<28} {}",
                    route.method().as_str(),
                    route.pattern(),
                    route.handler().describe()
                )
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route `request` and produce its response
    pub fn dispatch(&self, request: &Request, container: &Container) -> Response {
        self.dispatch_matched(request, container).0
    }

    /// Like [`dispatch`](Self::dispatch), also returning the matched pattern
    pub fn dispatch_matched(&self, request: &Request, container: &Container) -> (Response, Option<&str>) {
        let method = request.intended_method();
        let path = request.uri();

        let found = match_route(&self.routes, &method, path).or_else(|| {
            // HEAD is served by GET routes; the body is dropped on send
            (method == Method::HEAD)
                .then(|| match_route(&self.routes, &Method::GET, path))
                .flatten()
        });

        let Some((route, params)) = found else {
            logger::log_debug(&format!("[Router] {method} {path} -> no route"));
            return (not_found(request), None);
        };

        logger::log_debug(&format!(
            "[Router] {method} {path} -> {} ({})",
            route.pattern(),
            route.handler().describe()
        ));

        let response = dispatch::invoke(route.handler(), container, request, &params, self.debug);
        (response, Some(route.pattern()))
    }
}

fn not_found(request: &Request) -> Response {
    if request.wants_json() {
        Response::json(&serde_json::json!({ "message": "Not Found" }), 404)
    } else {
        Response::not_found("<h1>404 Not Found</h1>")
    }
}
