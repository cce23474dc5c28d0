//! User registration on top of the rowbind mapper.
//!
//! A [`UserService`] validates a [`RegisterUserRequest`], encrypts the
//! password under a fresh salt and stores a [`Users`] record. The user's
//! [`Credentials`] are a nested record, so both rows are written in one
//! transaction by `rowbind_query::Mapper`.
//!
//! Failures come back as classified `rowbind_core::Error`s; an
//! [`ErrorResponse`] turns one into the body sent to a client.
//!
//! ```rust,ignore
//! use rowbind_auth::{AuthConfig, ErrorResponse, RegisterUserRequest, SystemClock};
//!
//! let config = AuthConfig::from_env()?;
//! rowbind_auth::init_tracing(&config.log);
//! let service = rowbind_auth::open_user_service(&config)?;
//!
//! let request = RegisterUserRequest::new("alice", "alice@example.com", "Sup3r$ecret");
//! match service.register(&cx, &request).await {
//!     Outcome::Ok(id) => println!("created user {id}"),
//!     Outcome::Err(e) => {
//!         let body = ErrorResponse::from_error(&e, "/register", &SystemClock, &UuidErrorIds);
//!         println!("{}", body.to_json());
//!     }
//!     _ => {}
//! }
//! ```

pub mod app;
pub mod config;
pub mod encrypt;
pub mod models;
pub mod repository;
pub mod response;
pub mod service;
pub mod validate;

pub use app::{SqliteUserService, open_user_service, open_user_service_with_ids};
pub use config::{AuthConfig, DatabaseConfig, EncryptConfig, LogConfig, init_tracing};
pub use encrypt::{AesGcmEncryptor, PasswordEncryptor, verify_password};
pub use models::{Credentials, SQLITE_SCHEMA, Users};
pub use repository::{SqlUserRepository, UserRepository};
pub use response::{Clock, ErrorResponse, FixedClock, SystemClock, log_error};
pub use service::UserService;
pub use validate::RegisterUserRequest;
