//! Wiring of the registration service from an [`AuthConfig`].

use crate::config::AuthConfig;
use crate::encrypt::AesGcmEncryptor;
use crate::models::SQLITE_SCHEMA;
use crate::repository::SqlUserRepository;
use crate::service::UserService;
use rowbind_core::{Error, ErrorIdSource, UuidErrorIds};
use rowbind_sqlite::SqliteConnection;
use std::sync::Arc;

/// The registration service over SQLite.
pub type SqliteUserService = UserService<SqlUserRepository<SqliteConnection>, AesGcmEncryptor>;

/// Open the configured database, create the user tables if they are
/// missing, and build a [`SqliteUserService`] over it.
pub fn open_user_service(config: &AuthConfig) -> Result<SqliteUserService, Error> {
    open_user_service_with_ids(config, Arc::new(UuidErrorIds))
}

/// [`open_user_service`] with an explicit error id source, shared by the
/// mapper and the service.
pub fn open_user_service_with_ids(
    config: &AuthConfig,
    ids: Arc<dyn ErrorIdSource>,
) -> Result<SqliteUserService, Error> {
    let conn = SqliteConnection::open(&config.database.sqlite())?;
    conn.execute_raw(SQLITE_SCHEMA)?;
    tracing::info!(path = %config.database.path, "user store ready");

    let repository = SqlUserRepository::new(conn).with_error_ids(Arc::clone(&ids));
    let encryptor = AesGcmEncryptor::new(config.encrypt.iterations);
    Ok(UserService::new(repository, encryptor, config.encrypt.clone()).with_error_ids(ids))
}
