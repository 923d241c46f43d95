use offers_core::config::PostgresConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Connect to PostgreSQL and bring the schema up to date.
pub async fn init_pg_pool(config: &PostgresConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.connection_string())
        .await?;
    info!("PostgreSQL connected: {}:{}/{}", config.host, config.port, config.database);

    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("Database migrations applied successfully");

    Ok(pool)
}
