//! Configuration management for the billing services.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Numeric values that fail to parse fall back to their default with a
//! warning rather than aborting startup.

use billing_queue_amqp::AmqpConfig;
use billing_queue_postgres::PostgresConfig;
use billing_queue_runtime::retry::{Backoff, RetryPolicy};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// RabbitMQ connection and queue name
    pub amqp: AmqpConfig,
    /// Broker connection retry policy
    pub connect_retry: RetryPolicy,
    /// Order database
    pub postgres: PostgresConfig,
    /// HTTP listeners
    pub http: HttpConfig,
    /// Operation deadlines
    pub timeouts: Timeouts,
    /// Prometheus scrape port; `None` disables the exporter
    pub metrics_port: Option<u16>,
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Host to bind to
    pub host: String,
    /// Port of the API gateway
    pub gateway_port: u16,
    /// Port of the billing service
    pub billing_port: u16,
}

impl HttpConfig {
    /// `host:port` for the API gateway listener.
    #[must_use]
    pub fn gateway_addr(&self) -> String {
        format!("{}:{}", self.host, self.gateway_port)
    }

    /// `host:port` for the billing service listener.
    #[must_use]
    pub fn billing_addr(&self) -> String {
        format!("{}:{}", self.host, self.billing_port)
    }
}

/// Operation deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Upper bound for one confirmed publish
    pub publish: Duration,
    /// Upper bound for one `create_order` call
    pub store: Duration,
    /// Upper bound for the whole shutdown sequence
    pub shutdown: Duration,
}

impl Config {
    /// Load configuration from process environment variables.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a local `.env` file.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let amqp_defaults = AmqpConfig::default();
        let pg_defaults = PostgresConfig::default();

        let connect_attempts: usize = env.parsed("RABBITMQ_CONNECT_ATTEMPTS", 10);
        let connect_backoff: u64 = env.parsed("RABBITMQ_CONNECT_BACKOFF_SECS", 1);

        Self {
            amqp: AmqpConfig {
                host: env.string("RABBITMQ_HOST", &amqp_defaults.host),
                port: env.parsed("RABBITMQ_PORT", amqp_defaults.port),
                username: env.string("RABBITMQ_USER", &amqp_defaults.username),
                password: env.string("RABBITMQ_PASSWORD", &amqp_defaults.password),
                vhost: env.string("RABBITMQ_VHOST", &amqp_defaults.vhost),
                queue: env.string("RABBITMQ_QUEUE_NAME", &amqp_defaults.queue),
            },
            connect_retry: RetryPolicy::builder()
                .max_attempts(connect_attempts)
                .backoff(Backoff::linear(Duration::from_secs(connect_backoff)))
                .build(),
            postgres: PostgresConfig {
                host: env.string("BILLING_DB_HOST", &pg_defaults.host),
                port: env.parsed("BILLING_DB_PORT", pg_defaults.port),
                username: env.string("BILLING_DB_USER", &pg_defaults.username),
                password: env.string("BILLING_DB_PASSWORD", &pg_defaults.password),
                database: env.string("BILLING_DB_NAME", &pg_defaults.database),
                max_connections: env.parsed("BILLING_DB_MAX_CONNECTIONS", pg_defaults.max_connections),
                connect_timeout: env.secs(
                    "BILLING_DB_CONNECT_TIMEOUT_SECS",
                    pg_defaults.connect_timeout,
                ),
            },
            http: HttpConfig {
                host: env.string("HOST", "0.0.0.0"),
                gateway_port: env.parsed("API_GATEWAY_PORT", 3000),
                billing_port: env.parsed("BILLING_APP_PORT", 8080),
            },
            timeouts: Timeouts {
                publish: env.secs("PUBLISH_TIMEOUT_SECS", Duration::from_secs(10)),
                store: env.secs("STORE_TIMEOUT_SECS", Duration::from_secs(10)),
                shutdown: env.secs("SHUTDOWN_TIMEOUT_SECS", Duration::from_secs(30)),
            },
            metrics_port: env.optional("METRICS_PORT"),
        }
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str, default: &str) -> String {
        (self.0)(key).unwrap_or_else(|| default.to_string())
    }

    fn optional<T>(&self, key: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = (self.0)(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, value = %raw, error = %e, "Ignoring unparsable setting");
                None
            }
        }
    }

    fn parsed<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr,
        T::Err: Display,
    {
        self.optional(key).unwrap_or(default)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        self.optional(key).map_or(default, Duration::from_secs)
    }
}
