//! Database layer for reelcap.
//!
//! Provides the relational [`StateStore`](reelcap_common::StateStore)
//! backend and the [`FallbackStore`] decorator that switches to the file
//! backend when the database becomes unreachable.

pub mod entities;
pub mod fallback;
pub mod migrations;
pub mod repositories;
pub mod store;

pub use fallback::FallbackStore;
pub use store::RelationalStore;

use reelcap_common::{AppError, Config};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr, RuntimeErr};
use std::time::Duration;
use tracing::log::LevelFilter;

/// Initialize database connection.
///
/// Returns [`AppError::Config`] when no database URL is configured.
pub async fn init(config: &Config) -> Result<DatabaseConnection, AppError> {
    let url = config
        .database
        .url
        .as_deref()
        .ok_or_else(|| AppError::Config("database.url is not set".to_string()))?;

    let mut opt = ConnectOptions::new(url);
    opt.max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(LevelFilter::Debug);

    Database::connect(opt).await.map_err(db_error)
}

/// Run pending migrations.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), AppError> {
    use sea_orm_migration::MigratorTrait;
    migrations::Migrator::up(db, None).await.map_err(db_error)
}

/// Map a database error, separating connectivity loss from other failures.
///
/// Only connectivity loss becomes [`AppError::Unavailable`], which is what
/// makes the [`FallbackStore`] switch backends.
#[must_use]
pub fn db_error(err: DbErr) -> AppError {
    if is_connection_error(&err) {
        AppError::Unavailable(err.to_string())
    } else {
        AppError::Database(err.to_string())
    }
}

fn is_connection_error(err: &DbErr) -> bool {
    use sea_orm::sqlx::Error as SqlxError;

    match err {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => true,
        DbErr::Exec(RuntimeErr::SqlxError(e)) | DbErr::Query(RuntimeErr::SqlxError(e)) => {
            matches!(
                e,
                SqlxError::Io(_)
                    | SqlxError::Tls(_)
                    | SqlxError::PoolTimedOut
                    | SqlxError::PoolClosed
                    | SqlxError::WorkerCrashed
            )
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::ConnAcquireErr;

    #[test]
    fn test_connection_errors_are_unavailable() {
        let err = db_error(DbErr::Conn(RuntimeErr::Internal("refused".to_string())));
        assert!(err.is_unavailable());

        let err = db_error(DbErr::ConnectionAcquire(ConnAcquireErr::Timeout));
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_other_errors_are_database_errors() {
        let err = db_error(DbErr::Query(RuntimeErr::Internal("syntax".to_string())));
        assert!(matches!(err, AppError::Database(_)));

        let err = db_error(DbErr::RecordNotFound("user".to_string()));
        assert!(matches!(err, AppError::Database(_)));
    }

    #[tokio::test]
    async fn test_init_requires_url() {
        let err = init(&Config::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
