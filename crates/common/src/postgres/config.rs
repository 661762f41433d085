use serde::{Deserialize, Serialize};
use std::fmt;

/// PostgreSQL connection settings for the message store
#[derive(Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_pool_size: usize,
    /// Apply the bundled schema on startup
    pub run_migrations: bool,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "sms_relay".to_string(),
            username: "sms_relay".to_string(),
            password: "sms_relay".to_string(),
            max_pool_size: 10,
            run_migrations: true,
        }
    }
}

// Keeps the password out of startup logs
impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("max_pool_size", &self.max_pool_size)
            .field("run_migrations", &self.run_migrations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let config = PostgresConfig {
            password: "hunter2".to_string(),
            ..Default::default()
        };

        let rendered = format!("{config:?}");

        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("sms_relay"));
    }
}
