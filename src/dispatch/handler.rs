//! Handlers and handler results
//!
//! A route points at a [`Handler`]: either a closure or a controller action
//! resolved through the container on every dispatch. Whatever a handler
//! returns is normalized through [`Reply`].

use std::fmt;
use std::sync::Arc;

use crate::container::{Container, Injectable};
use crate::error::DispatchError;
use crate::http::{Request, Response};
use crate::routing::RouteParams;

/// What a handler may produce
#[derive(Debug)]
pub enum Reply {
    /// Passed through unchanged
    Response(Response),
    /// Wrapped into a 200 response with this body
    Text(String),
    /// Empty 200 response
    Empty,
}

impl Reply {
    pub fn into_response(self) -> Response {
        match self {
            Self::Response(response) => response,
            Self::Text(body) => Response::html(body),
            Self::Empty => Response::new(),
        }
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl From<String> for Reply {
    fn from(body: String) -> Self {
        Self::Text(body)
    }
}

impl From<&str> for Reply {
    fn from(body: &str) -> Self {
        Self::Text(body.to_string())
    }
}

impl From<()> for Reply {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

impl<T: Into<Self>> From<Option<T>> for Reply {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

/// Result every handler returns
pub type HandlerResult = Result<Reply, DispatchError>;

type ClosureFn = dyn Fn(&Request, &RouteParams) -> HandlerResult + Send + Sync;
type ActionFn = dyn Fn(&Container, &Request, &RouteParams) -> HandlerResult + Send + Sync;

/// Unit of code a matched route invokes
#[derive(Clone)]
pub enum Handler {
    Closure(Arc<ClosureFn>),
    Action {
        controller: &'static str,
        method: &'static str,
        call: Arc<ActionFn>,
    },
}

impl Handler {
    pub(crate) fn invoke(
        &self,
        container: &Container,
        request: &Request,
        params: &RouteParams,
    ) -> HandlerResult {
        match self {
            Self::Closure(f) => f(request, params),
            Self::Action { call, .. } => call(container, request, params),
        }
    }

    /// `Controller@method` for actions, `closure` otherwise
    pub fn describe(&self) -> String {
        match self {
            Self::Closure(_) => "closure".to_string(),
            Self::Action {
                controller, method, ..
            } => format!("{}@{method}", short_type_name(controller)),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

fn short_type_name(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}

/// Handler backed by a closure
pub fn closure<F, R>(f: F) -> Handler
where
    F: Fn(&Request, &RouteParams) -> Result<R, DispatchError> + Send + Sync + 'static,
    R: Into<Reply> + 'static,
{
    Handler::Closure(Arc::new(move |request, params| f(request, params).map(Into::into)))
}

/// Handler backed by a controller method.
///
/// The controller is built by the container each time the route matches, so
/// its dependencies follow their own binding lifetimes.
pub fn action<C, R>(
    method: &'static str,
    f: fn(&C, &Request, &RouteParams) -> Result<R, DispatchError>,
) -> Handler
where
    C: Injectable,
    R: Into<Reply> + 'static,
{
    Handler::Action {
        controller: std::any::type_name::<C>(),
        method,
        call: Arc::new(move |container, request, params| {
            let controller = container.make::<C>()?;
            f(&controller, request, params).map(Into::into)
        }),
    }
}

/// Conventional CRUD controller wired by [`Router::resource`](crate::routing::Router::resource)
pub trait ResourceController: Injectable {
    fn index(&self, request: &Request, params: &RouteParams) -> HandlerResult;
    fn create(&self, request: &Request, params: &RouteParams) -> HandlerResult;
    fn store(&self, request: &Request, params: &RouteParams) -> HandlerResult;
    fn show(&self, request: &Request, params: &RouteParams) -> HandlerResult;
    fn edit(&self, request: &Request, params: &RouteParams) -> HandlerResult;
    fn update(&self, request: &Request, params: &RouteParams) -> HandlerResult;
    fn destroy(&self, request: &Request, params: &RouteParams) -> HandlerResult;
}
