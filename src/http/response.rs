//! Outgoing response builder
//!
//! Mutated fluently by handlers, then consumed by [`Response::send`], which
//! persists flash data into the session store and produces the transport
//! response. `send` takes `self`, so a response can only be sent once.

use http_body_util::Full;
use hyper::body::Bytes;
use serde::Serialize;
use serde_json::Value;

use super::request::{Request, METHOD_OVERRIDE_FIELD};
use super::session::{Session, SessionMap, SessionStore, ERRORS_KEY, OLD_INPUT_KEY};
use super::cookies::session_cookie;
use crate::error::FieldErrors;
use crate::logger;

/// Transport-level response handed to hyper
pub type HttpResponse = hyper::Response<Full<Bytes>>;

const HTML: &str = "text/html; charset=utf-8";
const JSON: &str = "application/json";

/// Mutable response under construction
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    content: String,
    status: u16,
    headers: Vec<(String, String)>,
    flash: SessionMap,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// Empty 200 response
    pub fn new() -> Self {
        Self {
            content: String::new(),
            status: 200,
            headers: Vec::new(),
            flash: SessionMap::new(),
        }
    }

    /// 200 HTML response
    pub fn html(content: impl Into<String>) -> Self {
        Self::new().set_content(content).header("Content-Type", HTML)
    }

    /// 200 plain-text response
    pub fn text(content: impl Into<String>) -> Self {
        Self::new()
            .set_content(content)
            .header("Content-Type", "text/plain; charset=utf-8")
    }

    /// JSON response; a value that cannot be serialized yields a 500
    pub fn json<T: Serialize + ?Sized>(data: &T, status: u16) -> Self {
        match serde_json::to_string(data) {
            Ok(body) => Self::new()
                .set_content(body)
                .set_status_code(status)
                .header("Content-Type", JSON),
            Err(e) => {
                logger::log_error(&format!("Failed to serialize response: {e}"));
                Self::new()
                    .set_content(r#"{"error":"Internal server error"}"#)
                    .set_status_code(500)
                    .header("Content-Type", JSON)
            }
        }
    }

    /// Redirect to `url` with the given 3xx code
    pub fn redirect(url: &str, status: u16) -> Self {
        Self::new().set_status_code(status).header("Location", url)
    }

    /// Redirect to the page the request came from, or `/`
    pub fn back(request: &Request) -> Self {
        Self::redirect(request.referer().unwrap_or("/"), 302)
    }

    /// 404 page with `message` as body
    pub fn not_found(message: &str) -> Self {
        Self::html(message.to_string()).set_status_code(404)
    }

    #[must_use]
    pub fn set_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    #[must_use]
    pub const fn set_status_code(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set a header, replacing any previous value (names compare case-insensitively)
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Flash `key` to the next request
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.flash.insert(key.to_string(), value.into());
        self
    }

    /// Flash field errors to the next request
    #[must_use]
    pub fn with_errors(self, errors: &FieldErrors) -> Self {
        let errors: SessionMap = errors
            .iter()
            .map(|(field, message)| (field.clone(), Value::String(message.clone())))
            .collect();
        self.with(ERRORS_KEY, Value::Object(errors))
    }

    /// Flash the submitted body so the next page can repopulate its form
    #[must_use]
    pub fn with_input(self, request: &Request) -> Self {
        let input: SessionMap = request
            .body_params()
            .iter()
            .filter(|(k, _)| k.as_str() != METHOD_OVERRIDE_FIELD)
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.with(OLD_INPUT_KEY, Value::Object(input))
    }

    pub const fn status(&self) -> u16 {
        self.status
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub const fn flash(&self) -> &SessionMap {
        &self.flash
    }

    pub const fn is_redirect(&self) -> bool {
        matches!(self.status, 300..=399)
    }

    /// Persist flash data, then emit status line, headers and body.
    ///
    /// Consumes the response.
    pub fn send(self, ctx: &SendContext<'_>) -> HttpResponse {
        // Only sessions carrying flash data reach the store; a fresh one
        // gets its cookie at that point
        let persisted = !self.flash.is_empty();
        if persisted {
            ctx.store.put_flash(ctx.session.id(), self.flash);
        }

        let content_length = self.content.len();
        let mut builder = hyper::Response::builder()
            .status(self.status)
            .header("Server", ctx.server_name);

        let mut has_content_type = false;
        for (name, value) in &self.headers {
            has_content_type |= name.eq_ignore_ascii_case("content-type");
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !has_content_type && content_length > 0 {
            builder = builder.header("Content-Type", HTML);
        }
        if persisted && ctx.session.is_fresh() {
            builder = builder.header(
                "Set-Cookie",
                session_cookie(ctx.cookie_name, ctx.session.id(), ctx.cookie_path),
            );
        }
        builder = builder.header("Content-Length", content_length);

        let body = if ctx.head {
            Bytes::new()
        } else {
            Bytes::from(self.content)
        };

        builder.body(Full::new(body)).unwrap_or_else(|e| {
            logger::log_error(&format!("Failed to build {} response: {e}", self.status));
            let mut fallback = hyper::Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }
}

/// Per-transaction pieces `send` needs besides the response itself
pub struct SendContext<'a> {
    pub store: &'a dyn SessionStore,
    pub session: &'a Session,
    pub cookie_name: &'a str,
    pub cookie_path: &'a str,
    pub server_name: &'a str,
    /// HEAD requests get headers only
    pub head: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::session::MemorySessionStore;
    use hyper::Method;
    use serde_json::json;

    fn context<'a>(store: &'a MemorySessionStore, session: &'a Session) -> SendContext<'a> {
        SendContext {
            store,
            session,
            cookie_name: "GALERIASESSID",
            cookie_path: "/",
            server_name: "galeria-web",
            head: false,
        }
    }

    #[test]
    fn test_fluent_setters() {
        let resp = Response::new()
            .set_content("ok")
            .set_status_code(201)
            .header("X-Total", "3")
            .header("x-total", "4");
        assert_eq!(resp.status(), 201);
        assert_eq!(resp.content(), "ok");
        assert_eq!(resp.header_value("X-TOTAL"), Some("4"));
        assert_eq!(resp.headers().len(), 1);
    }

    #[test]
    fn test_json_and_redirects() {
        let resp = Response::json(&json!({"id": 1}), 201);
        assert_eq!(resp.status(), 201);
        assert_eq!(resp.content(), r#"{"id":1}"#);
        assert_eq!(resp.header_value("content-type"), Some("application/json"));

        let resp = Response::redirect("/artes", 303);
        assert!(resp.is_redirect());
        assert_eq!(resp.header_value("location"), Some("/artes"));

        let req = Request::builder().header("referer", "/artes/criar").build();
        assert_eq!(Response::back(&req).header_value("Location"), Some("/artes/criar"));
        let req = Request::builder().build();
        assert_eq!(Response::back(&req).header_value("Location"), Some("/"));
    }

    #[test]
    fn test_flash_helpers() {
        let req = Request::builder()
            .method(Method::POST)
            .form(&[("titulo", ""), ("_method", "PUT")])
            .build();
        let mut errors = FieldErrors::new();
        errors.insert("titulo".to_string(), "obrigatório".to_string());

        let resp = Response::back(&req)
            .with("aviso", "revise")
            .with_errors(&errors)
            .with_input(&req);

        assert_eq!(resp.flash().get("aviso"), Some(&json!("revise")));
        assert_eq!(resp.flash().get(ERRORS_KEY), Some(&json!({"titulo": "obrigatório"})));
        assert_eq!(resp.flash().get(OLD_INPUT_KEY), Some(&json!({"titulo": ""})));
    }

    #[test]
    fn test_send_writes_flash_then_transport() {
        let store = MemorySessionStore::new();
        let session = Session::fresh();
        let http = Response::html("<h1>Oi</h1>")
            .with("sucesso", "salvo")
            .send(&context(&store, &session));

        assert_eq!(http.status(), 200);
        assert_eq!(http.headers()["content-length"], "11");
        assert_eq!(http.headers()["server"], "galeria-web");
        let cookie = http.headers()["set-cookie"].to_str().unwrap();
        assert!(cookie.starts_with(&format!("GALERIASESSID={}", session.id())));

        let next = Session::open(&store, Some(session.id()));
        assert_eq!(next.flash("sucesso"), Some(&json!("salvo")));
    }

    #[test]
    fn test_fresh_session_without_flash_is_not_stored() {
        let store = MemorySessionStore::new();
        for _ in 0..100 {
            let session = Session::fresh();
            let http = Response::text("ok").send(&context(&store, &session));
            assert!(http.headers().get("set-cookie").is_none());
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_send_head_and_known_session() {
        let store = MemorySessionStore::new();
        store.save("known", crate::http::SessionRecord::default());
        let session = Session::open(&store, Some("known"));
        let mut ctx = context(&store, &session);
        ctx.head = true;

        let http = Response::text("corpo").send(&ctx);
        assert!(http.headers().get("set-cookie").is_none());
        assert_eq!(http.headers()["content-length"], "5");
        assert!(store.load("known").unwrap().flash.is_empty());
    }
}
