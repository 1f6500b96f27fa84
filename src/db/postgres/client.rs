use anyhow::Context;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::{info, warn};
use tokio_postgres::NoTls;

use crate::config::PostgresSettings;

/// A schema change, applied at most once and recorded in `schema_migrations`.
struct Migration {
    version: i32,
    name: &'static str,
    sql: &'static str,
}

/// Ordered by version. Never edit an entry once it has shipped; add a new one.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "create_prices_table",
    sql: include_str!("../../../schema/migrations/0001_create_prices_table.sql"),
}];

/// Split SQL into statements, respecting dollar-quoted strings.
/// This handles PostgreSQL function definitions that use $$ ... $$ blocks.
fn split_sql_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut in_dollar_quote = false;
    let bytes = sql.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if i + 1 < bytes.len() && bytes[i] == b'$' && bytes[i + 1] == b'$' {
            in_dollar_quote = !in_dollar_quote;
            i += 2;
            continue;
        }

        if bytes[i] == b';' && !in_dollar_quote {
            let stmt = &sql[start..i];
            if !stmt.trim().is_empty() {
                statements.push(stmt);
            }
            start = i + 1;
        }
        i += 1;
    }

    if start < sql.len() {
        let stmt = &sql[start..];
        if !stmt.trim().is_empty() {
            statements.push(stmt);
        }
    }

    statements
}

/// PostgreSQL client with connection pooling.
///
/// Owns the append-only `prices` history table. Uses `deadpool-postgres`
/// so the poller and concurrent API requests each borrow their own
/// connection.
#[derive(Clone)]
pub struct PostgresClient {
    pub pool: Pool,
}

impl PostgresClient {
    pub async fn new(settings: PostgresSettings) -> anyhow::Result<Self> {
        info!(
            "Connecting to PostgreSQL at {}:{}/{}",
            settings.host, settings.port, settings.database
        );

        let mut retries = 0;
        let max_retries = 5;
        let mut last_error: Option<anyhow::Error> = None;

        while retries < max_retries {
            let mut pg_config = tokio_postgres::Config::new();
            pg_config
                .host(&settings.host)
                .port(settings.port)
                .user(&settings.user)
                .password(&settings.password)
                .dbname(&settings.database);

            let mgr_config = ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            };

            let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
            let pool = Pool::builder(mgr)
                .max_size(settings.pool_size)
                .build()
                .context("Failed to create PostgreSQL connection pool")?;

            match pool.get().await {
                Ok(_conn) => {
                    info!("Successfully connected to PostgreSQL");
                    return Ok(Self { pool });
                },
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("{}", e));
                    retries += 1;

                    if retries >= max_retries {
                        break;
                    }

                    // Postgres may still be starting alongside us
                    let delay = std::time::Duration::from_millis(250 * 2_u64.pow(retries));
                    warn!(
                        "Failed to connect to PostgreSQL (attempt {}/{}), retrying in {:?}...",
                        retries, max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }

        Err(anyhow::anyhow!(
            "Failed to connect to PostgreSQL after {} attempts: {}",
            max_retries,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string())
        ))
    }

    /// Apply every migration not yet recorded in `schema_migrations`.
    ///
    /// Each migration runs in its own transaction together with its
    /// bookkeeping row, so a failed migration leaves no partial schema.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        info!("Running PostgreSQL migrations");
        let mut client = self.pool.get().await?;

        client
            .execute(
                r#"
                CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
                )
                "#,
                &[],
            )
            .await
            .context("Failed to create schema_migrations table")?;

        let applied: Vec<i32> = client
            .query("SELECT version FROM schema_migrations", &[])
            .await?
            .iter()
            .map(|row| row.get("version"))
            .collect();

        let mut count = 0;
        for migration in MIGRATIONS {
            if applied.contains(&migration.version) {
                continue;
            }

            info!(
                "Applying migration {:04}_{}",
                migration.version, migration.name
            );

            let tx = client.transaction().await?;
            for stmt in split_sql_statements(migration.sql) {
                let stmt = stmt.trim();
                if stmt.is_empty() {
                    continue;
                }
                tx.execute(stmt, &[]).await.with_context(|| {
                    format!(
                        "Failed to execute migration {:04} statement: {}",
                        migration.version, stmt
                    )
                })?;
            }
            tx.execute(
                "INSERT INTO schema_migrations (version, name) VALUES ($1, $2)",
                &[&migration.version, &migration.name],
            )
            .await?;
            tx.commit().await?;
            count += 1;
        }

        info!(
            "PostgreSQL migrations completed ({} applied, {} already present)",
            count,
            applied.len()
        );
        Ok(())
    }
}
