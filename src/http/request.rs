//! Incoming request snapshot
//!
//! A `Request` is captured once per transaction and never mutated: query and
//! body parameters, headers, uploaded files, cookies and the session view.
//! Accessors are the same whatever the verb.

use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, COOKIE, REFERER};
use hyper::{Method, Version};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;

use super::cookies::parse_cookie_header;
use super::multipart::{self, Part, UploadedFile};
use super::session::Session;
use crate::routing::normalize;

/// Form field carrying the method override
pub const METHOD_OVERRIDE_FIELD: &str = "_method";

/// Parameter map, ordered for stable output
pub type Params = BTreeMap<String, String>;

/// Immutable view of one incoming HTTP transaction
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    version: Version,
    path: String,
    base_path: String,
    raw_query: Option<String>,
    query: Params,
    body: Params,
    raw_body: Bytes,
    headers: HeaderMap,
    files: BTreeMap<String, UploadedFile>,
    cookies: BTreeMap<String, String>,
    session: Session,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// Verb as sent on the wire
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Verb the application should act on.
    ///
    /// A POST carrying `_method=PUT|PATCH|DELETE` is treated as that verb so
    /// HTML forms can reach update and delete routes.
    pub fn intended_method(&self) -> Method {
        if self.method != Method::POST {
            return self.method.clone();
        }
        match self
            .body
            .get(METHOD_OVERRIDE_FIELD)
            .map(|m| m.trim().to_ascii_uppercase())
            .as_deref()
        {
            Some("PUT") => Method::PUT,
            Some("PATCH") => Method::PATCH,
            Some("DELETE") => Method::DELETE,
            _ => Method::POST,
        }
    }

    pub const fn version(&self) -> Version {
        self.version
    }

    /// Path relative to the application root: no query string, leading
    /// `/`, no trailing `/`
    pub fn uri(&self) -> &str {
        &self.path
    }

    /// Public path for an application-relative `path`, with the base path
    /// the application is mounted under put back in front
    pub fn url(&self, path: &str) -> String {
        let path = normalize(path);
        if self.base_path.is_empty() {
            path
        } else if path == "/" {
            self.base_path.clone()
        } else {
            format!("{}{path}", self.base_path)
        }
    }

    /// Raw query string, without the leading `?`
    pub fn query_string(&self) -> Option<&str> {
        self.raw_query.as_deref()
    }

    /// Query and body parameters merged, body values winning
    pub fn all(&self) -> Params {
        let mut merged = self.query.clone();
        merged.extend(self.body.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Merged lookup, body first
    pub fn get(&self, key: &str) -> Option<&str> {
        self.body
            .get(key)
            .or_else(|| self.query.get(key))
            .map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Body parameter only
    pub fn post(&self, key: &str) -> Option<&str> {
        self.body.get(key).map(String::as_str)
    }

    /// Query parameter only
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub const fn body_params(&self) -> &Params {
        &self.body
    }

    pub const fn query_params(&self) -> &Params {
        &self.query
    }

    /// Subset of the merged parameters; absent keys are skipped
    pub fn only(&self, keys: &[&str]) -> Params {
        self.all()
            .into_iter()
            .filter(|(k, _)| keys.contains(&k.as_str()))
            .collect()
    }

    /// Merged parameters minus `keys`
    pub fn except(&self, keys: &[&str]) -> Params {
        self.all()
            .into_iter()
            .filter(|(k, _)| !keys.contains(&k.as_str()))
            .collect()
    }

    /// Parameter present, even if empty
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Parameter present and not blank
    pub fn filled(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.trim().is_empty())
    }

    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.get(field)
    }

    pub fn has_file(&self, field: &str) -> bool {
        self.files.get(field).is_some_and(|f| !f.is_empty())
    }

    pub const fn files(&self) -> &BTreeMap<String, UploadedFile> {
        &self.files
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub const fn session(&self) -> &Session {
        &self.session
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Raw request body
    pub const fn body(&self) -> &Bytes {
        &self.raw_body
    }

    /// `Referer` header, if any
    pub fn referer(&self) -> Option<&str> {
        self.headers.get(REFERER).and_then(|v| v.to_str().ok())
    }

    /// Request issued by script (`X-Requested-With: XMLHttpRequest`)
    pub fn is_ajax(&self) -> bool {
        self.header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
    }

    /// Client prefers a JSON answer
    pub fn wants_json(&self) -> bool {
        self.is_ajax()
            || self
                .headers
                .get(ACCEPT)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|accept| accept.contains("application/json") || accept.contains("+json"))
    }

    /// Client address: first `X-Forwarded-For` entry, then `Client-IP`,
    /// then the socket peer
    pub fn ip(&self) -> Option<String> {
        let forwarded = self
            .header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let client_ip = self
            .header("client-ip")
            .or_else(|| self.header("x-client-ip"))
            .map(str::trim)
            .filter(|v| !v.is_empty());

        forwarded
            .or(client_ip)
            .map(ToString::to_string)
            .or_else(|| self.remote_addr.map(|a| a.ip().to_string()))
    }

    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Body parsed as a JSON object; empty when absent or malformed
    pub fn json(&self) -> Map<String, Value> {
        match serde_json::from_slice::<Value>(&self.raw_body) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Builds a [`Request`] from transport pieces
#[derive(Debug, Default)]
pub struct RequestBuilder {
    method: Option<Method>,
    version: Option<Version>,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
    base_path: String,
    session: Option<Session>,
    remote_addr: Option<SocketAddr>,
}

impl RequestBuilder {
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    #[must_use]
    pub const fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Request target, path and optional query
    #[must_use]
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Header; invalid names or values are ignored
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// URL-encoded form body, with matching content type
    #[must_use]
    pub fn form(self, fields: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.header("content-type", "application/x-www-form-urlencoded")
            .body(encoded)
    }

    /// Prefix stripped from the path so routes see application-relative paths
    #[must_use]
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    #[must_use]
    pub fn session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    #[must_use]
    pub const fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn build(self) -> Request {
        let (raw_path, raw_query) = match self.uri.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (self.uri.clone(), None),
        };

        let query = raw_query
            .as_deref()
            .map(decode_urlencoded)
            .unwrap_or_default();

        let content_type = self
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let (body, files) = decode_body(&content_type, &self.body);

        let cookies = self
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|header| parse_cookie_header(header).into_iter())
            .collect();

        let base_path = match self.base_path.trim_end_matches('/') {
            "" => String::new(),
            base => normalize(base),
        };

        Request {
            method: self.method.unwrap_or(Method::GET),
            version: self.version.unwrap_or(Version::HTTP_11),
            path: strip_base_path(&raw_path, &base_path),
            base_path,
            raw_query,
            query,
            body,
            raw_body: self.body,
            headers: self.headers,
            files,
            cookies,
            session: self.session.unwrap_or_default(),
            remote_addr: self.remote_addr,
        }
    }
}

fn decode_urlencoded(input: &str) -> Params {
    url::form_urlencoded::parse(input.as_bytes())
        .into_owned()
        .collect()
}

fn decode_body(content_type: &str, body: &Bytes) -> (Params, BTreeMap<String, UploadedFile>) {
    let mut files = BTreeMap::new();
    if body.is_empty() {
        return (Params::new(), files);
    }

    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let params = match mime.as_str() {
        "application/x-www-form-urlencoded" => decode_urlencoded(&String::from_utf8_lossy(body)),
        "multipart/form-data" => {
            let mut fields = Params::new();
            if let Some(boundary) = multipart::boundary(content_type) {
                for part in multipart::parse(body, &boundary) {
                    match part {
                        Part::Field { name, value } => {
                            fields.insert(name, value);
                        }
                        Part::File(file) => {
                            files.insert(file.field.clone(), file);
                        }
                    }
                }
            }
            fields
        }
        m if m == "application/json" || m.ends_with("+json") => json_scalars(body),
        _ => Params::new(),
    };

    (params, files)
}

/// Top-level scalar members of a JSON object, as strings
fn json_scalars(body: &Bytes) -> Params {
    let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) else {
        return Params::new();
    };
    map.into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                Value::Array(_) | Value::Object(_) => return None,
            };
            Some((key, text))
        })
        .collect()
}

fn strip_base_path(path: &str, base_path: &str) -> String {
    let base = base_path.trim_end_matches('/');
    let relative = if base.is_empty() {
        path
    } else {
        match path.strip_prefix(base) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        }
    };
    normalize(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_uri_strips_query_and_base_path() {
        let req = Request::builder()
            .uri("/galeria/artes/42/?ordem=asc")
            .base_path("/galeria")
            .build();
        assert_eq!(req.uri(), "/artes/42");
        assert_eq!(req.query("ordem"), Some("asc"));
        assert_eq!(req.query_string(), Some("ordem=asc"));

        let root = Request::builder().uri("/galeria").base_path("/galeria/").build();
        assert_eq!(root.uri(), "/");

        // Only whole segments are stripped
        let other = Request::builder().uri("/galeriax/a").base_path("/galeria").build();
        assert_eq!(other.uri(), "/galeriax/a");

        let bare = Request::builder().uri("artes").build();
        assert_eq!(bare.uri(), "/artes");
    }

    #[test]
    fn test_url_restores_base_path() {
        let req = Request::builder().uri("/galeria/artes").base_path("galeria/").build();
        assert_eq!(req.url("/artes/3"), "/galeria/artes/3");
        assert_eq!(req.url("artes/"), "/galeria/artes");
        assert_eq!(req.url("/"), "/galeria");

        let plain = Request::builder().build();
        assert_eq!(plain.url("/artes/3"), "/artes/3");
        assert_eq!(plain.url("/"), "/");
    }

    #[test]
    fn test_merged_and_scoped_lookup() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/artes?pagina=2&titulo=da-query")
            .form(&[("titulo", "Abaporu"), ("artista", "Tarsila"), ("obs", "  ")])
            .build();

        assert_eq!(req.get("titulo"), Some("Abaporu"));
        assert_eq!(req.query("titulo"), Some("da-query"));
        assert_eq!(req.post("pagina"), None);
        assert_eq!(req.get("pagina"), Some("2"));
        assert_eq!(req.get_or("preco", "0"), "0");
        assert_eq!(req.all().len(), 4);

        assert!(req.has("obs"));
        assert!(!req.filled("obs"));
        assert!(req.filled("artista"));

        let only = req.only(&["titulo", "inexistente"]);
        assert_eq!(only.len(), 1);
        let except = req.except(&["obs", "pagina"]);
        assert_eq!(except.keys().collect::<Vec<_>>(), ["artista", "titulo"]);
    }

    #[test]
    fn test_method_override() {
        let put = Request::builder()
            .method(Method::POST)
            .form(&[("_method", "put")])
            .build();
        assert_eq!(put.method(), Method::POST);
        assert_eq!(put.intended_method(), Method::PUT);

        let bogus = Request::builder()
            .method(Method::POST)
            .form(&[("_method", "TRACE")])
            .build();
        assert_eq!(bogus.intended_method(), Method::POST);

        // Only POST can be overridden
        let get = Request::builder()
            .uri("/x?_method=DELETE")
            .build();
        assert_eq!(get.intended_method(), Method::GET);
    }

    #[test]
    fn test_json_body() {
        let req = Request::builder()
            .method(Method::POST)
            .header("content-type", "application/json")
            .body(r#"{"_method":"DELETE","id":7,"ativo":true,"tags":["a"]}"#)
            .build();
        assert_eq!(req.post("id"), Some("7"));
        assert_eq!(req.post("ativo"), Some("true"));
        assert_eq!(req.post("tags"), None);
        assert_eq!(req.intended_method(), Method::DELETE);
        assert_eq!(req.json().get("tags"), Some(&json!(["a"])));

        let broken = Request::builder().body("{nope").build();
        assert!(broken.json().is_empty());
    }

    #[test]
    fn test_content_negotiation() {
        let ajax = Request::builder()
            .header("x-requested-with", "XMLHttpRequest")
            .build();
        assert!(ajax.is_ajax());
        assert!(ajax.wants_json());

        let api = Request::builder()
            .header("accept", "application/json, text/plain")
            .build();
        assert!(!api.is_ajax());
        assert!(api.wants_json());

        let browser = Request::builder()
            .header("accept", "text/html,application/xhtml+xml")
            .build();
        assert!(!browser.wants_json());
    }

    #[test]
    fn test_ip_precedence() {
        let peer: SocketAddr = "10.0.0.9:5123".parse().unwrap();
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("client-ip", "198.51.100.2")
            .remote_addr(peer)
            .build();
        assert_eq!(req.ip().as_deref(), Some("203.0.113.7"));

        let req = Request::builder()
            .header("client-ip", "198.51.100.2")
            .remote_addr(peer)
            .build();
        assert_eq!(req.ip().as_deref(), Some("198.51.100.2"));

        let req = Request::builder().remote_addr(peer).build();
        assert_eq!(req.ip().as_deref(), Some("10.0.0.9"));

        assert_eq!(Request::builder().build().ip(), None);
    }

    #[test]
    fn test_cookies_and_files() {
        let body = "--b\r\nContent-Disposition: form-data; name=\"titulo\"\r\n\r\nOperarios\r\n\
                    --b\r\nContent-Disposition: form-data; name=\"foto\"; filename=\"op.jpg\"\r\n\
                    Content-Type: image/jpeg\r\n\r\nJPEG\r\n--b--\r\n";
        let req = Request::builder()
            .method(Method::POST)
            .header("cookie", "GALERIASESSID=s1; tema=claro")
            .header("content-type", "multipart/form-data; boundary=b")
            .body(body)
            .build();
        assert_eq!(req.cookie("tema"), Some("claro"));
        assert_eq!(req.post("titulo"), Some("Operarios"));
        assert!(req.has_file("foto"));
        assert_eq!(req.file("foto").map(|f| f.size()), Some(4));
        assert!(!req.has_file("outra"));
    }
}
