// Cookie helpers
// Parsing of the Cookie request header and rendering of Set-Cookie values

use cookie::{Cookie, SameSite};
use std::collections::BTreeMap;

/// Parse a `Cookie` header; malformed pairs are skipped
pub fn parse_cookie_header(header: &str) -> BTreeMap<String, String> {
    Cookie::split_parse(header)
        .filter_map(Result::ok)
        .map(|c| (c.name().to_string(), c.value().to_string()))
        .collect()
}

/// `Set-Cookie` value for a session id
pub fn session_cookie(name: &str, id: &str, path: &str) -> String {
    Cookie::build((name.to_string(), id.to_string()))
        .path(path.to_string())
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookie_header() {
        let cookies = parse_cookie_header("GALERIASESSID=abc123; tema=escuro");
        assert_eq!(cookies.get("GALERIASESSID").map(String::as_str), Some("abc123"));
        assert_eq!(cookies.get("tema").map(String::as_str), Some("escuro"));
    }

    #[test]
    fn test_parse_skips_garbage() {
        let cookies = parse_cookie_header("a=1; ;=; b=2");
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn test_session_cookie() {
        let value = session_cookie("GALERIASESSID", "abc", "/");
        assert!(value.starts_with("GALERIASESSID=abc"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("Path=/"));
        assert!(value.contains("SameSite=Lax"));
    }
}
