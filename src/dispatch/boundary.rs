//! Dispatch boundary
//!
//! The only place handler failures are caught. Every [`DispatchError`], and
//! any panic raised while the handler runs, leaves here as a [`Response`].

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::json;

use super::handler::Handler;
use crate::container::Container;
use crate::error::DispatchError;
use crate::http::{Request, Response};
use crate::logger;
use crate::routing::RouteParams;

const VALIDATION_MESSAGE: &str = "The given data was invalid.";
const SERVER_ERROR_MESSAGE: &str = "Server Error";

/// Run `handler` and normalize whatever comes out of it
pub fn invoke(
    handler: &Handler,
    container: &Container,
    request: &Request,
    params: &RouteParams,
    debug: bool,
) -> Response {
    let outcome = catch_unwind(AssertUnwindSafe(|| handler.invoke(container, request, params)))
        .unwrap_or_else(|payload| {
            Err(DispatchError::unexpected(format!(
                "handler {} panicked: {}",
                handler.describe(),
                panic_message(payload.as_ref())
            )))
        });

    match outcome {
        Ok(reply) => reply.into_response(),
        Err(err) => render_error(&err, request, debug),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Translate a handler failure into the response the client sees
pub fn render_error(err: &DispatchError, request: &Request, debug: bool) -> Response {
    match err {
        DispatchError::Validation(errors) => {
            if request.wants_json() {
                Response::json(
                    &json!({ "message": VALIDATION_MESSAGE, "errors": errors }),
                    err.status_code(),
                )
            } else {
                Response::back(request)
                    .with_errors(errors)
                    .with_input(request)
            }
        }
        DispatchError::NotFound(message) => {
            if request.wants_json() {
                Response::json(&json!({ "message": message }), err.status_code())
            } else {
                Response::not_found(&escape_html(message))
            }
        }
        DispatchError::Resolution(_) | DispatchError::Unexpected(_) => {
            logger::log_dispatch_failure(request.method().as_str(), request.uri(), err);
            server_error(err, request, debug)
        }
    }
}

fn server_error(err: &DispatchError, request: &Request, debug: bool) -> Response {
    let status = err.status_code();

    if request.wants_json() {
        let body = if debug {
            json!({ "message": err.to_string(), "trace": trace(err).lines().collect::<Vec<_>>() })
        } else {
            json!({ "message": SERVER_ERROR_MESSAGE })
        };
        return Response::json(&body, status);
    }

    let page = if debug {
        format!(
            "<h1>500 Internal Server Error</h1>\n<p>{}</p>\n<pre>{}</pre>\n",
            escape_html(&err.to_string()),
            escape_html(&trace(err))
        )
    } else {
        format!("<h1>500 Internal Server Error</h1>\n<p>{SERVER_ERROR_MESSAGE}</p>\n")
    };
    Response::html(page).set_status_code(status)
}

/// Cause chain, plus the captured backtrace when one exists
fn trace(err: &DispatchError) -> String {
    match err {
        // anyhow's alternate rendering carries the chain and the backtrace
        DispatchError::Unexpected(inner) => format!("{inner:?}"),
        other => logger::cause_chain(other),
    }
}

/// Minimal HTML escaping for text placed in error pages
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
