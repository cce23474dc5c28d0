//! User persistence.

use crate::models::Users;
use asupersync::{Cx, Outcome};
use rowbind_core::{Connection, Error, ErrorIdSource, PersistError, PersistErrorKind};
use rowbind_query::Mapper;
use std::future::Future;
use std::sync::Arc;

pub const OP_ADD_USER: &str = "repositories.add_user";

/// Storage for registered users.
pub trait UserRepository: Send + Sync {
    /// Store `user` and its credentials, returning the new user id.
    fn add_user(&self, cx: &Cx, user: Users) -> impl Future<Output = Outcome<i64, Error>> + Send;
}

/// [`UserRepository`] over any rowbind connection.
#[derive(Debug)]
pub struct SqlUserRepository<C> {
    mapper: Mapper<C>,
}

impl<C: Connection> SqlUserRepository<C> {
    pub fn new(conn: C) -> Self {
        Self {
            mapper: Mapper::new(conn),
        }
    }

    pub fn with_error_ids(mut self, ids: Arc<dyn ErrorIdSource>) -> Self {
        self.mapper = self.mapper.with_error_ids(ids);
        self
    }

    pub fn mapper(&self) -> &Mapper<C> {
        &self.mapper
    }

    pub fn connection(&self) -> &C {
        self.mapper.connection()
    }
}

impl<C: Connection> UserRepository for SqlUserRepository<C> {
    #[tracing::instrument(level = "debug", skip_all, fields(username = %user.username))]
    async fn add_user(&self, cx: &Cx, user: Users) -> Outcome<i64, Error> {
        match self.mapper.insert(cx, &user).await {
            Outcome::Ok(id) => {
                tracing::debug!(id, "user stored");
                Outcome::Ok(id)
            }
            Outcome::Err(e) => Outcome::Err(Error::Persist(PersistError::wrap(
                PersistErrorKind::Context,
                OP_ADD_USER,
                "Failed to register user",
                e,
                self.mapper.error_ids(),
            ))),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}
