//! Access log format module
//!
//! Supports multiple log formats:
//! - `combined` (Apache/Nginx combined format)
//! - `common` (Common Log Format - CLF)
//! - `json` (one JSON object per line)
//! - Custom patterns with variables

use chrono::Local;
use serde_json::json;

/// Access log entry containing all request/response information
#[derive(Debug, Clone)]
pub struct AccessLogEntry {
    /// Client IP address
    pub remote_addr: String,
    pub time: chrono::DateTime<Local>,
    /// Verb as sent on the wire
    pub method: String,
    /// Verb the router acted on, when `_method` changed it
    pub effective_method: Option<String>,
    pub path: String,
    /// Query string (without leading ?)
    pub query: Option<String>,
    /// HTTP version (1.0, 1.1, 2)
    pub http_version: String,
    pub status: u16,
    /// Response body size in bytes
    pub body_bytes: usize,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    /// Pattern of the route that handled the request
    pub route: Option<String>,
    /// Request processing time in microseconds
    pub request_time_us: u64,
}

impl AccessLogEntry {
    /// Create a new access log entry with current timestamp
    pub fn new(remote_addr: String, method: String, path: String) -> Self {
        Self {
            remote_addr,
            time: Local::now(),
            method,
            effective_method: None,
            path,
            query: None,
            http_version: "1.1".to_string(),
            status: 200,
            body_bytes: 0,
            referer: None,
            user_agent: None,
            route: None,
            request_time_us: 0,
        }
    }

    /// Format the log entry according to the specified format
    pub fn format(&self, format: &str) -> String {
        match format {
            "combined" => self.format_combined(),
            "common" => self.format_common(),
            "json" => self.format_json(),
            custom => self.format_custom(custom),
        }
    }

    fn request_uri(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{q}", self.path),
            None => self.path.clone(),
        }
    }

    fn time_local(&self) -> String {
        self.time.format("%d/%b/%Y:%H:%M:%S %z").to_string()
    }

    /// `$remote_addr - - [$time_local] "$request" $status $body_bytes_sent "$http_referer" "$http_user_agent"`
    fn format_combined(&self) -> String {
        format!(
            "{} \"{}\" \"{}\"",
            self.format_common(),
            self.referer.as_deref().unwrap_or("-"),
            self.user_agent.as_deref().unwrap_or("-"),
        )
    }

    /// `$remote_addr - - [$time_local] "$request" $status $body_bytes_sent`
    fn format_common(&self) -> String {
        format!(
            "{} - - [{}] \"{} {} HTTP/{}\" {} {}",
            self.remote_addr,
            self.time_local(),
            self.method,
            self.request_uri(),
            self.http_version,
            self.status,
            self.body_bytes,
        )
    }

    fn format_json(&self) -> String {
        json!({
            "remote_addr": self.remote_addr,
            "time": self.time.to_rfc3339(),
            "method": self.method,
            "effective_method": self.effective_method,
            "path": self.path,
            "query": self.query,
            "http_version": self.http_version,
            "status": self.status,
            "body_bytes": self.body_bytes,
            "referer": self.referer,
            "user_agent": self.user_agent,
            "route": self.route,
            "request_time_us": self.request_time_us,
        })
        .to_string()
    }

    /// Custom format with variable substitution
    ///
    /// Supported variables:
    /// - `$remote_addr`, `$time_local`, `$time_iso8601`
    /// - `$request` (request line), `$request_method`, `$request_uri`
    /// - `$effective_method` (after `_method` override)
    /// - `$status`, `$body_bytes_sent`
    /// - `$http_referer`, `$http_user_agent`
    /// - `$route` (matched pattern, `-` for 404s)
    /// - `$request_time` in seconds, 3 decimal places
    fn format_custom(&self, pattern: &str) -> String {
        let request_uri = self.request_uri();
        let request_line = format!("{} {} HTTP/{}", self.method, request_uri, self.http_version);
        #[allow(clippy::cast_precision_loss)]
        let request_time = self.request_time_us as f64 / 1_000_000.0;

        let lookup = |name: &str| -> Option<String> {
            let value = match name {
                "remote_addr" => self.remote_addr.clone(),
                "time_local" => self.time_local(),
                "time_iso8601" => self.time.to_rfc3339(),
                "request_time" => format!("{request_time:.3}"),
                "request_method" => self.method.clone(),
                "request_uri" => request_uri.clone(),
                "request" => request_line.clone(),
                "effective_method" => self.effective_method.clone().unwrap_or_else(|| self.method.clone()),
                "status" => self.status.to_string(),
                "body_bytes_sent" => self.body_bytes.to_string(),
                "http_referer" => self.referer.clone().unwrap_or_else(|| "-".to_string()),
                "http_user_agent" => self.user_agent.clone().unwrap_or_else(|| "-".to_string()),
                "route" => self.route.clone().unwrap_or_else(|| "-".to_string()),
                _ => return None,
            };
            Some(value)
        };

        // Single pass over the pattern, so substituted values are never rescanned
        let mut result = String::with_capacity(pattern.len() * 2);
        let mut rest = pattern;
        while let Some(pos) = rest.find('$') {
            result.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            match lookup(&after[..len]) {
                Some(value) => result.push_str(&value),
                None => {
                    result.push('$');
                    result.push_str(&after[..len]);
                }
            }
            rest = &after[len..];
        }
        result.push_str(rest);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_entry() -> AccessLogEntry {
        let mut entry = AccessLogEntry::new(
            "192.168.1.1".to_string(),
            "POST".to_string(),
            "/artes/7".to_string(),
        );
        entry.effective_method = Some("PUT".to_string());
        entry.query = Some("aba=dados".to_string());
        entry.status = 302;
        entry.body_bytes = 1234;
        entry.referer = Some("https://galeria.test/artes/7/editar".to_string());
        entry.user_agent = Some("Mozilla/5.0".to_string());
        entry.route = Some("/artes/{id}".to_string());
        entry.request_time_us = 1500;
        entry
    }

    #[test]
    fn test_format_combined() {
        let log = create_test_entry().format("combined");
        assert!(log.starts_with("192.168.1.1 - - ["));
        assert!(log.contains("\"POST /artes/7?aba=dados HTTP/1.1\" 302 1234"));
        assert!(log.contains("\"https://galeria.test/artes/7/editar\""));
        assert!(log.ends_with("\"Mozilla/5.0\""));
    }

    #[test]
    fn test_format_common() {
        let log = create_test_entry().format("common");
        assert!(log.contains("\"POST /artes/7?aba=dados HTTP/1.1\" 302 1234"));
        // Common format does not include referer/user-agent
        assert!(!log.contains("galeria.test"));
    }

    #[test]
    fn test_format_json() {
        let log = create_test_entry().format("json");
        let value: serde_json::Value = serde_json::from_str(&log).unwrap();
        assert_eq!(value["method"], "POST");
        assert_eq!(value["effective_method"], "PUT");
        assert_eq!(value["route"], "/artes/{id}");
        assert_eq!(value["status"], 302);
        assert_eq!(value["body_bytes"], 1234);
    }

    #[test]
    fn test_format_custom() {
        let log = create_test_entry().format("$remote_addr $effective_method $route $status $request_time");
        assert_eq!(log, "192.168.1.1 PUT /artes/{id} 302 0.002");

        let mut unmatched = create_test_entry();
        unmatched.route = None;
        unmatched.effective_method = None;
        assert_eq!(unmatched.format("$request_method $effective_method $route"), "POST POST -");
    }

    #[test]
    fn test_format_custom_leaves_client_values_alone() {
        let mut entry = create_test_entry();
        entry.user_agent = Some("bot $route $status".to_string());
        entry.referer = Some("$remote_addr".to_string());
        assert_eq!(
            entry.format("$http_user_agent | $http_referer | $status"),
            "bot $route $status | $remote_addr | 302"
        );
        assert_eq!(entry.format("$desconhecido $"), "$desconhecido $");
    }
}
