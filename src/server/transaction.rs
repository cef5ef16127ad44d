//! Transaction handling
//!
//! One HTTP request in, one response out: collect the body, open the session,
//! build the `Request`, create a fresh container, dispatch, send and log.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{COOKIE, USER_AGENT};
use hyper::{HeaderMap, Method, StatusCode, Version};

use crate::config::Config;
use crate::container::Container;
use crate::http::cookies::parse_cookie_header;
use crate::http::{HttpResponse, Request, SendContext, Session, SessionStore};
use crate::logger::{self, AccessLogEntry};
use crate::routing::Router;

type Bootstrap = dyn Fn() -> Container + Send + Sync;

/// Everything a transaction needs, shared by all connections
pub struct Kernel {
    config: Config,
    router: Router,
    store: Arc<dyn SessionStore>,
    bootstrap: Box<Bootstrap>,
}

impl Kernel {
    /// `bootstrap` builds the container for one transaction. Process-wide
    /// singletons are shared by capturing their `Arc`s in the closure.
    pub fn new<F>(config: Config, mut router: Router, store: Arc<dyn SessionStore>, bootstrap: F) -> Self
    where
        F: Fn() -> Container + Send + Sync + 'static,
    {
        router.set_debug(config.app.debug);
        Self {
            config,
            router,
            store,
            bootstrap: Box::new(bootstrap),
        }
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Bindings a freshly bootstrapped container starts with
    pub fn container_bindings(&self) -> Vec<String> {
        (self.bootstrap)().describe()
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Run one transaction over an already collected body
    pub fn handle(&self, req: hyper::Request<Bytes>, remote_addr: Option<SocketAddr>) -> HttpResponse {
        let started = Instant::now();
        let (parts, body) = req.into_parts();

        let session_id = session_cookie(&parts.headers, &self.config.session.cookie_name);
        let session = Session::open(self.store.as_ref(), session_id.as_deref());

        let target = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);

        let mut builder = Request::builder()
            .method(parts.method)
            .version(parts.version)
            .uri(target)
            .headers(parts.headers)
            .body(body)
            .base_path(self.config.app.base_path.clone())
            .session(session);
        if let Some(addr) = remote_addr {
            builder = builder.remote_addr(addr);
        }
        let request = builder.build();

        let container = (self.bootstrap)();
        let (response, route) = self.router.dispatch_matched(&request, &container);

        let status = response.status();
        let body_bytes = response.content().len();
        let route = route.map(ToString::to_string);

        let ctx = SendContext {
            store: self.store.as_ref(),
            session: request.session(),
            cookie_name: &self.config.session.cookie_name,
            cookie_path: &self.config.session.cookie_path,
            server_name: &self.config.http.server_name,
            head: request.method() == Method::HEAD,
        };
        let http = response.send(&ctx);

        if self.config.logging.access_log {
            let mut entry = AccessLogEntry::new(
                request.ip().unwrap_or_else(|| "-".to_string()),
                request.method().to_string(),
                request.uri().to_string(),
            );
            let effective = request.intended_method();
            if effective != request.method() {
                entry.effective_method = Some(effective.to_string());
            }
            entry.query = request.query_string().map(ToString::to_string);
            entry.http_version = version_label(request.version()).to_string();
            entry.status = status;
            entry.body_bytes = body_bytes;
            entry.referer = request.referer().map(ToString::to_string);
            entry.user_agent = request.header(USER_AGENT.as_str()).map(ToString::to_string);
            entry.route = route;
            entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
            logger::log_access(&entry, &self.config.logging.access_log_format);
        }

        http
    }

    /// Reply sent when the body exceeds `http.max_body_size`
    fn payload_too_large(&self) -> HttpResponse {
        hyper::Response::builder()
            .status(StatusCode::PAYLOAD_TOO_LARGE)
            .header("Server", self.config.http.server_name.as_str())
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(Full::new(Bytes::from_static(b"Payload Too Large")))
            .unwrap_or_else(|e| {
                logger::log_error(&format!("Failed to build 413 response: {e}"));
                hyper::Response::new(Full::new(Bytes::new()))
            })
    }
}

fn session_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|header| parse_cookie_header(header).remove(name))
}

const fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

/// Declared `Content-Length` above the limit
fn declared_too_large(headers: &HeaderMap, max_body_size: u64) -> bool {
    headers
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .is_some_and(|size| size > max_body_size)
}

/// hyper service entry point
pub async fn handle_request(
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    kernel: Arc<Kernel>,
) -> Result<HttpResponse, Infallible> {
    let max_body_size = kernel.config.http.max_body_size;

    if declared_too_large(req.headers(), max_body_size) {
        logger::log_warning(&format!(
            "Request body too large: {} {} (max: {max_body_size} bytes)",
            req.method(),
            req.uri().path()
        ));
        return Ok(kernel.payload_too_large());
    }

    let (parts, body) = req.into_parts();
    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            // Over the limit without a Content-Length, or a transport error
            logger::log_warning(&format!("Failed to read request body: {e}"));
            return Ok(kernel.payload_too_large());
        }
    };

    let req = hyper::Request::from_parts(parts, body);
    // Handlers are synchronous; keep them off the reactor threads
    let response = tokio::task::spawn_blocking(move || kernel.handle(req, Some(remote_addr)))
        .await
        .unwrap_or_else(|e| {
            logger::log_error(&format!("Transaction task failed: {e}"));
            let mut fallback = hyper::Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        });
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::closure;
    use crate::error::DispatchError;
    use crate::http::{MemorySessionStore, Response};
    use crate::routing::RouteParams;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    fn test_config() -> Config {
        let mut config = Config::defaults().unwrap();
        config.logging.access_log = false;
        config
    }

    fn kernel() -> Kernel {
        let mut router = Router::new();
        router
            .get(
                "/",
                closure(|req: &Request, _: &RouteParams| {
                    let aviso = req.session().flash("aviso").and_then(|v| v.as_str()).unwrap_or("-");
                    Ok::<_, DispatchError>(format!("aviso={aviso}"))
                }),
            )
            .unwrap()
            .post(
                "/avisar",
                closure(|_: &Request, _: &RouteParams| {
                    Ok::<_, DispatchError>(Response::redirect("/", 302).with("aviso", "salvo"))
                }),
            )
            .unwrap();

        // Shared across transactions through the bootstrap closure
        let shared = Arc::new(Counter(AtomicUsize::new(0)));
        Kernel::new(test_config(), router, Arc::new(MemorySessionStore::new()), move || {
            let mut container = Container::new();
            container.instance(Arc::clone(&shared));
            container
        })
    }

    fn request(method: &str, uri: &str, cookie: Option<&str>) -> hyper::Request<Bytes> {
        let mut builder = hyper::Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        builder.body(Bytes::new()).unwrap()
    }

    async fn body_text(resp: HttpResponse) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_flash_survives_exactly_one_request() {
        let kernel = kernel();

        let first = kernel.handle(request("POST", "/avisar", None), None);
        assert_eq!(first.status(), 302);
        let set_cookie = first.headers()["set-cookie"].to_str().unwrap().to_string();
        let cookie = set_cookie.split(';').next().unwrap().to_string();

        let second = kernel.handle(request("GET", "/", Some(&cookie)), None);
        assert!(second.headers().get("set-cookie").is_none());
        assert_eq!(body_text(second).await, "aviso=salvo");

        let third = kernel.handle(request("GET", "/", Some(&cookie)), None);
        assert_eq!(body_text(third).await, "aviso=-");
    }

    #[tokio::test]
    async fn test_unknown_cookie_starts_fresh_session() {
        let kernel = kernel();
        let resp = kernel.handle(request("POST", "/avisar", Some("GALERIASESSID=forjado")), None);
        let cookie = resp.headers()["set-cookie"].to_str().unwrap();
        assert!(!cookie.contains("forjado"));
        assert_eq!(kernel.store().load("forjado"), None);
    }

    #[test]
    fn test_cookieless_requests_leave_no_sessions() {
        let store = Arc::new(MemorySessionStore::new());
        let shared: Arc<dyn SessionStore> = store.clone();
        let kernel = Kernel::new(test_config(), Router::new(), shared, Container::new);
        for _ in 0..1000 {
            let resp = kernel.handle(request("GET", "/", None), None);
            assert!(resp.headers().get("set-cookie").is_none());
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let kernel = kernel();
        let resp = kernel.handle(request("HEAD", "/", None), None);
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-length"], "7");
        assert!(body_text(resp).await.is_empty());
    }

    #[tokio::test]
    async fn test_base_path_and_404() {
        let mut config = test_config();
        config.app.base_path = "/galeria".to_string();
        let kernel = Kernel::new(config, Router::new(), Arc::new(MemorySessionStore::new()), Container::new);
        let resp = kernel.handle(request("GET", "/galeria/nada", None), None);
        assert_eq!(resp.status(), 404);
        assert_eq!(resp.headers()["server"], "galeria-web");
    }

    #[test]
    fn test_container_per_transaction_shares_captured_singleton() {
        let kernel = kernel();
        let a = (kernel.bootstrap)().resolve::<Counter>().unwrap();
        let b = (kernel.bootstrap)().resolve::<Counter>().unwrap();
        a.0.fetch_add(1, Ordering::SeqCst);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_container_bindings_listed() {
        let lines = kernel().container_bindings();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("Counter: singleton instance"));
    }

    #[test]
    fn test_declared_size_check() {
        let mut headers = HeaderMap::new();
        assert!(!declared_too_large(&headers, 10));
        headers.insert(hyper::header::CONTENT_LENGTH, "11".parse().unwrap());
        assert!(declared_too_large(&headers, 10));
        assert!(!declared_too_large(&headers, 11));
    }

    #[test]
    fn test_version_label() {
        assert_eq!(version_label(Version::HTTP_10), "1.0");
        assert_eq!(version_label(Version::HTTP_11), "1.1");
        assert_eq!(version_label(Version::HTTP_2), "2");
    }
}
