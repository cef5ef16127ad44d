//! Route matching module
//!
//! First match wins: routes are tried in registration order and there is no
//! specificity ranking, so `/artes/criar` must be registered before
//! `/artes/{id}` to be reachable.

use hyper::Method;

use super::params::RouteParams;
use super::pattern::CompiledPattern;
use crate::dispatch::Handler;

/// A registered route
#[derive(Debug, Clone)]
pub struct Route {
    method: Method,
    pattern: CompiledPattern,
    handler: Handler,
}

impl Route {
    pub const fn new(method: Method, pattern: CompiledPattern, handler: Handler) -> Self {
        Self {
            method,
            pattern,
            handler,
        }
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Full pattern, group prefixes included
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub const fn handler(&self) -> &Handler {
        &self.handler
    }
}

/// Find the first route for `method` whose pattern matches `path`
pub fn match_route<'a>(
    routes: &'a [Route],
    method: &Method,
    path: &str,
) -> Option<(&'a Route, RouteParams)> {
    routes
        .iter()
        .filter(|route| route.method == *method)
        .find_map(|route| route.pattern.captures(path).map(|params| (route, params)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::closure;
    use crate::error::DispatchError;
    use crate::http::Request;
    use crate::routing::ParamValue;

    fn make_route(method: Method, pattern: &str) -> Route {
        let handler = closure(|_: &Request, _: &RouteParams| Ok::<_, DispatchError>(()));
        Route::new(method, CompiledPattern::compile(pattern).unwrap(), handler)
    }

    #[test]
    fn test_match_route_order() {
        let routes = vec![
            make_route(Method::GET, "/artes/{id}"),
            make_route(Method::GET, "/artes/criar"),
        ];

        // Registration order wins over specificity
        let (route, params) = match_route(&routes, &Method::GET, "/artes/criar").unwrap();
        assert_eq!(route.pattern(), "/artes/{id}");
        assert_eq!(params.get("id"), Some(&ParamValue::Str("criar".to_string())));
    }

    #[test]
    fn test_match_route_filters_method() {
        let routes = vec![
            make_route(Method::POST, "/artes"),
            make_route(Method::GET, "/artes"),
        ];

        let (route, _) = match_route(&routes, &Method::GET, "/artes").unwrap();
        assert_eq!(route.method(), Method::GET);
        assert!(match_route(&routes, &Method::DELETE, "/artes").is_none());
    }

    #[test]
    fn test_match_route_anchored() {
        let routes = vec![make_route(Method::GET, "/artes")];
        assert!(match_route(&routes, &Method::GET, "/artes/1").is_none());
        assert!(match_route(&routes, &Method::GET, "/x/artes").is_none());
    }
}
