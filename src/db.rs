use rocket::fairing::AdHoc;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::AppError;
use crate::store::{PostgresRepository, SharedRepository};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

pub async fn init_pool(db_config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .acquire_timeout(Duration::from_secs(db_config.acquire_timeout))
        .connect(&db_config.url)
        .await
}

pub async fn run_migrations(database_url: &str) -> Result<(), AppError> {
    let (mut client, connection) = tokio_postgres::connect(database_url, tokio_postgres::NoTls)
        .await
        .map_err(|e| AppError::Migration {
            message: format!("Failed to connect for migrations: {}", e),
        })?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "migration connection error");
        }
    });

    let report = embedded::migrations::runner()
        .run_async(&mut client)
        .await
        .map_err(|e| AppError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

    for migration in report.applied_migrations() {
        tracing::info!(migration = %migration, "applied migration");
    }

    Ok(())
}

/// Runs migrations, opens the pool and manages the Postgres-backed repository.
pub fn stage_db(db_config: DatabaseConfig) -> AdHoc {
    AdHoc::try_on_ignite("Postgres (sqlx)", |rocket| async move {
        if db_config.run_migrations
            && let Err(e) = run_migrations(&db_config.url).await
        {
            tracing::error!(error = ?e, "database migrations failed");
            return Err(rocket);
        }

        match init_pool(&db_config).await {
            Ok(pool) => {
                tracing::info!("Database pool initialized successfully");
                let repo: SharedRepository = Arc::new(PostgresRepository { pool });
                Ok(rocket.manage(repo))
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize database pool");
                Err(rocket)
            }
        }
    })
}
