use crate::postgres::PostgresConfig;
use anyhow::{Context, Result};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Schema migrations, applied in order. Each statement is idempotent.
const MIGRATIONS: &[(&str, &str)] = &[(
    "20250101000000_create_messages",
    include_str!("../../migrations/postgres/20250101000000_create_messages.sql"),
)];

/// PostgreSQL client wrapper with connection pooling
#[derive(Clone)]
pub struct PostgresClient {
    pool: Pool,
}

impl PostgresClient {
    pub fn new(
        host: &str,
        port: u16,
        database: &str,
        username: &str,
        password: &str,
        max_pool_size: usize,
    ) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(host.to_string());
        cfg.port = Some(port);
        cfg.dbname = Some(database.to_string());
        cfg.user = Some(username.to_string());
        cfg.password = Some(password.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create PostgreSQL pool")?;
        pool.resize(max_pool_size);

        Ok(Self { pool })
    }

    pub fn from_config(config: &PostgresConfig) -> Result<Self> {
        Self::new(
            &config.host,
            config.port,
            &config.database,
            &config.username,
            &config.password,
            config.max_pool_size,
        )
    }

    pub async fn ping(&self) -> Result<()> {
        let client = self.get_connection().await?;
        client
            .execute("SELECT 1", &[])
            .await
            .context("PostgreSQL ping failed")?;
        debug!("postgreSQL connection successful");
        Ok(())
    }

    /// Apply the bundled schema migrations
    pub async fn run_migrations(&self) -> Result<()> {
        let client = self.get_connection().await?;

        for (name, sql) in MIGRATIONS {
            client
                .batch_execute(sql)
                .await
                .with_context(|| format!("Failed to apply migration {name}"))?;
            info!(migration = %name, "applied migration");
        }

        Ok(())
    }

    pub async fn get_connection(&self) -> Result<deadpool_postgres::Client> {
        self.pool
            .get()
            .await
            .context("Failed to get PostgreSQL connection from pool")
    }
}
