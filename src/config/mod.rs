// Configuration module entry point
// Layered settings: built-in defaults, then an optional file, then environment

mod types;

use std::net::SocketAddr;

pub use types::{
    AppConfig, Config, HttpConfig, LoggingConfig, PerformanceConfig, ServerConfig, SessionConfig,
};

/// Config file looked up when none is given (extension optional)
pub const DEFAULT_CONFIG_PATH: &str = "galeria";

impl Config {
    /// Load configuration from specified file path (extension optional).
    ///
    /// A missing file is not an error. `GALERIA_*` variables override file
    /// values, `__` separating sections: `GALERIA_APP__DEBUG=true`.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        Self::builder()?
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("GALERIA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Defaults only, no file or environment
    pub fn defaults() -> Result<Self, config::ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.backlog", 1024)?
            .set_default("app.name", "Galeria")?
            .set_default("app.debug", false)?
            .set_default("app.base_path", "")?
            .set_default("session.cookie_name", "GALERIASESSID")?
            .set_default("session.cookie_path", "/")?
            .set_default("session.idle_timeout", 7200)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .set_default("performance.keep_alive", true)?
            .set_default("performance.request_timeout", 30)?
            .set_default("http.server_name", "galeria-web")?
            .set_default("http.max_body_size", 10_485_760) // 10MB
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}
