//! Service configuration read from the environment.
//!
//! # Environment Variables
//!
//! - `PORT`: listening port (default: 3001)
//! - `APP_ENV`: environment label reported by health and debug (default: `development`)
//! - `MONGODB_URI` / `MONGODB_DATABASE`: see [`ConnectionConfig::from_env`]

use neoride_lib::ConnectionConfig;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_ENVIRONMENT: &str = "development";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub environment: String,
    pub connection: ConnectionConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let environment = std::env::var("APP_ENV")
            .ok()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

        Self {
            port,
            environment,
            connection: ConnectionConfig::from_env(),
        }
    }

    /// Configuration with defaults and the given connection settings.
    pub fn with_connection(connection: ConnectionConfig) -> Self {
        Self {
            port: DEFAULT_PORT,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            connection,
        }
    }

    /// Presence of the connection string, never its value.
    pub fn uri_status(&self) -> &'static str {
        if self.connection.has_uri() {
            "Set (value hidden)"
        } else {
            "Not set"
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}
