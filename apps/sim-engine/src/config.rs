//! Environment-driven configuration.
//!
//! Recognized variables:
//!
//! - `HTTP_PORT` - listen port (default 8080)
//! - `POSTGRES_CONNECTION_STRING` - external bar store
//! - `COSMOS_CONNECTION_STRING` - external session store
//! - `USE_INMEMORY_COSMOS` - force the in-memory session store
//! - `ApiKeys__N__Key` / `__Secret` / `__Name` - accepted credentials
//! - `RUST_LOG` - tracing filter

/// Resolved process configuration.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// HTTP listen port.
    pub http_port: u16,
    /// Bar-store connection string, when an external store is deployed.
    pub postgres_connection: Option<String>,
    /// Session-store connection string, when an external store is deployed.
    pub cosmos_connection: Option<String>,
    /// Force the in-memory session store regardless of connection strings.
    pub use_inmemory_sessions: bool,
}

impl SimConfig {
    /// Read configuration from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let http_port = std::env::var("HTTP_PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(8080);
        let postgres_connection = std::env::var("POSTGRES_CONNECTION_STRING").ok();
        let cosmos_connection = std::env::var("COSMOS_CONNECTION_STRING").ok();
        let use_inmemory_sessions = std::env::var("USE_INMEMORY_COSMOS")
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(cosmos_connection.is_none());

        Self {
            http_port,
            postgres_connection,
            cosmos_connection,
            use_inmemory_sessions,
        }
    }
}
