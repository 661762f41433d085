use common::postgres::PostgresConfig;
use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use message_pipeline::{MessagePipelineWorkerConfig, MessageServiceConfig, ReadBackConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where message records live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS configuration
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// JetStream stream holding every message event
    #[serde(default = "default_nats_message_stream")]
    pub nats_message_stream: String,

    /// Subject filter for the delivery worker
    #[serde(default = "default_nats_message_subject")]
    pub nats_message_subject: String,

    #[serde(default = "default_nats_consumer_name")]
    pub nats_consumer_name: String,

    #[serde(default = "default_nats_batch_size")]
    pub nats_batch_size: usize,

    #[serde(default = "default_nats_batch_wait_ms")]
    pub nats_batch_wait_ms: u64,

    // Store configuration
    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackend,

    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    #[serde(default = "default_postgres_run_migrations")]
    pub postgres_run_migrations: bool,

    // Pipeline configuration
    /// Zero disables read-back retries
    #[serde(default = "default_read_back_timeout_ms")]
    pub read_back_timeout_ms: u64,

    #[serde(default = "default_read_back_initial_backoff_ms")]
    pub read_back_initial_backoff_ms: u64,

    #[serde(default = "default_read_back_max_backoff_ms")]
    pub read_back_max_backoff_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_message_stream() -> String {
    "message_events".to_string()
}

fn default_nats_message_subject() -> String {
    "message_events.>".to_string()
}

fn default_nats_consumer_name() -> String {
    "sms-relay-message-events".to_string()
}

fn default_nats_batch_size() -> usize {
    32
}

fn default_nats_batch_wait_ms() -> u64 {
    1_000
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Memory
}

fn default_postgres_host() -> String {
    PostgresConfig::default().host
}

fn default_postgres_port() -> u16 {
    PostgresConfig::default().port
}

fn default_postgres_database() -> String {
    PostgresConfig::default().database
}

fn default_postgres_username() -> String {
    PostgresConfig::default().username
}

fn default_postgres_password() -> String {
    PostgresConfig::default().password
}

fn default_postgres_max_pool_size() -> usize {
    PostgresConfig::default().max_pool_size
}

fn default_postgres_run_migrations() -> bool {
    PostgresConfig::default().run_migrations
}

fn default_read_back_timeout_ms() -> u64 {
    ReadBackConfig::default().timeout.as_millis() as u64
}

fn default_read_back_initial_backoff_ms() -> u64 {
    ReadBackConfig::default().initial_backoff.as_millis() as u64
}

fn default_read_back_max_backoff_ms() -> u64 {
    ReadBackConfig::default().max_backoff.as_millis() as u64
}

fn default_request_timeout_ms() -> u64 {
    MessageServiceConfig::default().request_timeout.as_millis() as u64
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "sms-relay".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_startup_timeout_secs() -> u64 {
    10
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    /// Load configuration from `SMS_RELAY_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("SMS_RELAY"))
            .build()?
            .try_deserialize()
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    pub fn postgres(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
            run_migrations: self.postgres_run_migrations,
        }
    }

    pub fn message_service(&self) -> MessageServiceConfig {
        MessageServiceConfig {
            read_back: ReadBackConfig {
                timeout: Duration::from_millis(self.read_back_timeout_ms),
                initial_backoff: Duration::from_millis(self.read_back_initial_backoff_ms),
                max_backoff: Duration::from_millis(self.read_back_max_backoff_ms),
            },
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    pub fn worker(&self) -> MessagePipelineWorkerConfig {
        MessagePipelineWorkerConfig {
            stream: self.nats_message_stream.clone(),
            subject_filter: self.nats_message_subject.clone(),
            consumer_name: self.nats_consumer_name.clone(),
            batch_size: self.nats_batch_size,
            batch_wait: Duration::from_millis(self.nats_batch_wait_ms),
        }
    }
}
