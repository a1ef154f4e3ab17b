//! Broker connection settings.

use lapin::uri::{AMQPAuthority, AMQPScheme, AMQPUri, AMQPUserInfo};

/// Default queue name shared by producer and consumer.
pub const DEFAULT_QUEUE_NAME: &str = "billing_queue";

/// Where the broker lives and which queue to bind to.
///
/// `Debug` output never includes the password.
#[derive(Clone, PartialEq, Eq)]
pub struct AmqpConfig {
    /// Broker host name or address.
    pub host: String,
    /// Broker AMQP port.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Virtual host.
    pub vhost: String,
    /// Durable queue name.
    pub queue: String,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            queue: DEFAULT_QUEUE_NAME.to_string(),
        }
    }
}

impl AmqpConfig {
    /// Connection URI for the client library.
    #[must_use]
    pub fn uri(&self) -> AMQPUri {
        AMQPUri {
            scheme: AMQPScheme::AMQP,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.username.clone(),
                    password: self.password.clone(),
                },
                host: self.host.clone(),
                port: self.port,
            },
            vhost: self.vhost.clone(),
            query: AMQPUri::default().query,
        }
    }

    /// `host:port/vhost`, for logs.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}{}", self.host, self.port, display_vhost(&self.vhost))
    }
}

fn display_vhost(vhost: &str) -> String {
    if vhost.starts_with('/') {
        vhost.to_string()
    } else {
        format!("/{vhost}")
    }
}

impl std::fmt::Debug for AmqpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("vhost", &self.vhost)
            .field("queue", &self.queue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_password() {
        let config = AmqpConfig {
            password: "s3cret".into(),
            ..AmqpConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn uri_carries_every_setting() {
        let config = AmqpConfig {
            host: "rabbit".into(),
            port: 5673,
            username: "billing".into(),
            password: "pw".into(),
            vhost: "orders".into(),
            queue: "q".into(),
        };
        let uri = config.uri();
        assert_eq!(uri.authority.host, "rabbit");
        assert_eq!(uri.authority.port, 5673);
        assert_eq!(uri.authority.userinfo.username, "billing");
        assert_eq!(uri.authority.userinfo.password, "pw");
        assert_eq!(uri.vhost, "orders");
    }

    #[test]
    fn endpoint_is_log_safe() {
        assert_eq!(AmqpConfig::default().endpoint(), "localhost:5672/");
    }
}
