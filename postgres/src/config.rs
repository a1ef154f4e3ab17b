//! Database connection settings.

use sqlx::postgres::PgConnectOptions;
use std::time::Duration;

/// Where the order database lives and how to pool connections to it.
///
/// `Debug` output never includes the password.
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Database name.
    pub database: String,
    /// Pool size cap.
    pub max_connections: u32,
    /// How long to wait for a connection before giving up.
    pub connect_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "orders".to_string(),
            max_connections: 5,
            connect_timeout: Duration::from_secs(3),
        }
    }
}

impl PostgresConfig {
    /// Connection options for sqlx.
    #[must_use]
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.database)
    }
}

impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}
