//! User registration.

use crate::config::EncryptConfig;
use crate::encrypt::{PasswordEncryptor, SALT_LENGTH};
use crate::models::{Credentials, Users};
use crate::repository::UserRepository;
use crate::validate::RegisterUserRequest;
use asupersync::{Cx, Outcome};
use rowbind_core::{Error, ErrorIdSource, PersistError, PersistErrorKind, UuidErrorIds};
use std::sync::Arc;

pub const OP_ADD_USER: &str = "services.add_user";
pub const OP_REGISTER: &str = "services.register";

/// Registers users: encrypts their password and stores them.
pub struct UserService<R, E> {
    repository: R,
    encryptor: E,
    encrypt: EncryptConfig,
    ids: Arc<dyn ErrorIdSource>,
}

impl<R: UserRepository, E: PasswordEncryptor> UserService<R, E> {
    pub fn new(repository: R, encryptor: E, encrypt: EncryptConfig) -> Self {
        Self {
            repository,
            encryptor,
            encrypt,
            ids: Arc::new(UuidErrorIds),
        }
    }

    /// Use a different source of error identifiers.
    pub fn with_error_ids(mut self, ids: Arc<dyn ErrorIdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Encrypt `password` under a fresh salt and store the user.
    ///
    /// The inputs are taken as given; use [`register`](Self::register) to
    /// validate them first.
    #[tracing::instrument(level = "debug", skip_all, fields(username = %username))]
    pub async fn add_user(
        &self,
        cx: &Cx,
        username: &str,
        email: &str,
        password: &str,
    ) -> Outcome<i64, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }

        let salt = self.encryptor.generate_salt(SALT_LENGTH, true, true);
        let pass_hash = match self
            .encryptor
            .encrypt(password, &salt, &self.encrypt.password)
        {
            Ok(encrypted) => encrypted,
            Err(e) => return Outcome::Err(self.wrap(OP_ADD_USER, "Failed to encrypt password", e)),
        };

        let user = Users::new(username, email, Credentials::new(salt, pass_hash));
        match self.repository.add_user(cx, user).await {
            Outcome::Ok(id) => Outcome::Ok(id),
            Outcome::Err(e) => Outcome::Err(self.wrap(OP_ADD_USER, "Failed to register user", e)),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Validate `request`, then [`add_user`](Self::add_user).
    #[tracing::instrument(level = "debug", skip_all, fields(username = %request.username))]
    pub async fn register(&self, cx: &Cx, request: &RegisterUserRequest) -> Outcome<i64, Error> {
        if let Err(e) = request.validate() {
            let err = self.wrap(OP_REGISTER, "Invalid fields", e);
            tracing::warn!(error = %err, "registration rejected");
            return Outcome::Err(err);
        }

        match self
            .add_user(cx, &request.username, &request.email, &request.password)
            .await
        {
            Outcome::Ok(id) => {
                tracing::info!(id, "user registered");
                Outcome::Ok(id)
            }
            Outcome::Err(e) => Outcome::Err(self.wrap(OP_REGISTER, "Failed to register user", e)),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    fn wrap(&self, op: &'static str, message: &str, source: Error) -> Error {
        Error::Persist(PersistError::wrap(
            PersistErrorKind::Context,
            op,
            message,
            source,
            self.ids.as_ref(),
        ))
    }
}

impl<R, E> std::fmt::Debug for UserService<R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserService")
            .field("encrypt", &self.encrypt)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encrypt::AesGcmEncryptor;
    use crate::validate::{EMAIL_MESSAGE, USERNAME_LENGTH_MESSAGE};
    use asupersync::runtime::RuntimeBuilder;
    use rowbind_core::error::{QueryError, QueryErrorKind};
    use rowbind_core::{Fault, FixedErrorIds};
    use std::future::Future;
    use std::sync::Mutex;

    fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
        match outcome {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => panic!("unexpected error: {e}"),
            Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
            Outcome::Panicked(p) => panic!("panicked: {p:?}"),
        }
    }

    /// Records every user it is given; fails with a unique violation when
    /// `fail` is set.
    #[derive(Default)]
    struct RecordingRepository {
        users: Mutex<Vec<Users>>,
        fail: bool,
    }

    impl UserRepository for RecordingRepository {
        fn add_user(
            &self,
            _cx: &Cx,
            user: Users,
        ) -> impl Future<Output = Outcome<i64, Error>> + Send {
            let result = if self.fail {
                let root = PersistError::classified(
                    PersistErrorKind::Constraint,
                    "mapper.insert",
                    "Constraint violation: failed to insert entry",
                    Some(Error::Query(QueryError {
                        kind: QueryErrorKind::Constraint,
                        sql: None,
                        sqlstate: Some("23505".to_string()),
                        message: "duplicate".to_string(),
                        detail: None,
                        source: None,
                    })),
                    &FixedErrorIds::new("db-1"),
                );
                Outcome::Err(root.into())
            } else {
                let mut users = self.users.lock().unwrap();
                users.push(user);
                Outcome::Ok(users.len() as i64)
            };
            async move { result }
        }
    }

    /// Encrypts by concatenation so stored values are predictable.
    struct PlainEncryptor;

    impl PasswordEncryptor for PlainEncryptor {
        fn generate_salt(&self, length: usize, _numbers: bool, _symbols: bool) -> String {
            "s".repeat(length)
        }

        fn encrypt(&self, password: &str, salt: &str, pepper: &str) -> Result<String, Error> {
            if password == "explode" {
                return Err(Error::Custom("cipher unavailable".to_string()));
            }
            Ok(format!("{password}|{}|{pepper}", salt.len()))
        }

        fn decrypt(&self, encrypted: &str, _salt: &str, _pepper: &str) -> Result<String, Error> {
            Ok(encrypted.split('|').next().unwrap_or_default().to_string())
        }
    }

    fn pepper() -> EncryptConfig {
        EncryptConfig {
            password: "pepper".to_string(),
            iterations: 1_000,
        }
    }

    fn service(fail: bool) -> UserService<RecordingRepository, PlainEncryptor> {
        let repo = RecordingRepository {
            fail,
            ..RecordingRepository::default()
        };
        UserService::new(repo, PlainEncryptor, pepper())
            .with_error_ids(Arc::new(FixedErrorIds::new("svc-1")))
    }

    #[test]
    fn add_user_stores_salted_ciphertext() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let svc = service(false);

        rt.block_on(async {
            let id = unwrap_outcome(
                svc.add_user(&cx, "alice", "alice@example.com", "Sup3r$ecret")
                    .await,
            );
            assert_eq!(id, 1);
        });

        let users = svc.repository().users.lock().unwrap();
        let stored = &users[0];
        assert_eq!(stored.username, "alice");
        assert_eq!(stored.email, "alice@example.com");
        assert_eq!(stored.credentials.salt.len(), SALT_LENGTH);
        assert_eq!(stored.credentials.pass_hash, "Sup3r$ecret|64|pepper");
    }

    #[test]
    fn encryption_failure_is_wrapped() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let svc = service(false);

        rt.block_on(async {
            let Outcome::Err(err) = svc.add_user(&cx, "alice", "a@b.com", "explode").await else {
                panic!("expected encryption failure");
            };
            assert_eq!(err.fault(), Fault::Server);
            assert_eq!(err.error_id(), Some("svc-1"));
            let p = err.persist().unwrap();
            assert_eq!(p.op, OP_ADD_USER);
            assert_eq!(p.message, "Failed to encrypt password");
        });
        assert!(svc.repository().users.lock().unwrap().is_empty());
    }

    #[test]
    fn repository_failure_keeps_root_id_and_fault() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let svc = service(true);

        rt.block_on(async {
            let Outcome::Err(err) = svc.add_user(&cx, "alice", "a@b.com", "Sup3r$ecret").await
            else {
                panic!("expected repository failure");
            };
            assert_eq!(err.fault(), Fault::Client);
            assert_eq!(err.error_id(), Some("db-1"));
            assert_eq!(err.sqlstate(), Some("23505"));
            assert_eq!(err.to_string().split(": ").next(), Some(OP_ADD_USER));
        });
    }

    #[test]
    fn register_rejects_invalid_requests_before_storing() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let svc = service(false);

        rt.block_on(async {
            for (req, expected) in [
                (
                    RegisterUserRequest::new("al", "alice@example.com", "Sup3r$ecret"),
                    USERNAME_LENGTH_MESSAGE,
                ),
                (
                    RegisterUserRequest::new("alice", "nope", "Sup3r$ecret"),
                    EMAIL_MESSAGE,
                ),
            ] {
                let Outcome::Err(err) = svc.register(&cx, &req).await else {
                    panic!("expected validation failure");
                };
                assert_eq!(err.fault(), Fault::Client);
                let Error::Persist(p) = &err else {
                    panic!("expected wrapped error");
                };
                assert_eq!(p.message, "Invalid fields");
                let Some(Error::Validation(v)) = p.source.as_deref() else {
                    panic!("expected validation source");
                };
                assert_eq!(v.first_message(), Some(expected));
            }
        });
        assert!(svc.repository().users.lock().unwrap().is_empty());
    }

    #[test]
    fn register_stores_a_valid_request() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let svc = service(false);

        rt.block_on(async {
            let req = RegisterUserRequest::new("alice", "alice@example.com", "Sup3r$ecret");
            assert_eq!(unwrap_outcome(svc.register(&cx, &req).await), 1);
        });
    }

    #[test]
    fn real_encryptor_stores_a_decryptable_password() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let svc = UserService::new(
            RecordingRepository::default(),
            AesGcmEncryptor::new(1_000),
            pepper(),
        );

        rt.block_on(async {
            unwrap_outcome(svc.add_user(&cx, "alice", "a@b.com", "Sup3r$ecret").await);
        });

        let users = svc.repository().users.lock().unwrap();
        let creds = &users[0].credentials;
        assert!(creds.pass_hash.contains('-'));
        let encryptor = AesGcmEncryptor::new(1_000);
        assert_eq!(
            encryptor
                .decrypt(&creds.pass_hash, &creds.salt, "pepper")
                .unwrap(),
            "Sup3r$ecret"
        );
        assert!(crate::encrypt::verify_password(
            &encryptor,
            "Sup3r$ecret",
            &creds.salt,
            "pepper",
            &creds.pass_hash,
        ));
    }
}
