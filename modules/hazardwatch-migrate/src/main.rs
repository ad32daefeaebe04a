//! Runs pending SQLx migrations against the database. Migrations are
//! embedded at compile time. Used as a deployment entrypoint step before
//! starting the pipeline or the API.

use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = hazardwatch_common::Config::migrate_from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await?;

    tracing::info!("running pending migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("migrations complete");

    Ok(())
}
