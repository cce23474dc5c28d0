//! Registration request validation.
//!
//! Checks run in a fixed order and stop at the first failure, so a caller
//! always gets exactly one message back: username, then password length,
//! then password characters, then email.

use regex::Regex;
use rowbind_core::{Error, ValidationError, ValidationErrorKind};
use serde::Deserialize;
use std::sync::OnceLock;

pub const USERNAME_LENGTH_MESSAGE: &str =
    "The size of the username must be more than 3 and less than 64";
pub const PASSWORD_LENGTH_MESSAGE: &str =
    "Password must have a minimum of eight characters and a maximum of 16";
pub const PASSWORD_SPACES_MESSAGE: &str = "Spaces in password is not allowed";
pub const PASSWORD_CLASSES_MESSAGE: &str =
    "Password must have one upper case, one lower case, one number and a special char";
pub const EMAIL_MESSAGE: &str = "Invalid email";

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 63;
const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 16;

// A bare `local@domain`, or one in angle brackets after a display name.
const EMAIL_PATTERN: &str = concat!(
    r#"^(?:[^<>@]*<[^\s@<>()\[\]\\,;:"]+@[^\s@<>()\[\]\\,;:"]+>"#,
    r#"|[^\s@<>()\[\]\\,;:"]+@[^\s@<>()\[\]\\,;:"]+)$"#,
);

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| match Regex::new(EMAIL_PATTERN) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(error = %e, "Invalid email pattern, rejecting all addresses");
                None
            }
        })
        .as_ref()
}

/// Body of a registration request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RegisterUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl RegisterUserRequest {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    /// Validate every field, returning the first violation as
    /// [`Error::Validation`].
    pub fn validate(&self) -> Result<(), Error> {
        let mut errors = ValidationError::new();
        self.check(&mut errors);
        errors.into_result().map_err(Error::Validation)
    }

    fn check(&self, errors: &mut ValidationError) {
        let len = self.username.len();
        if len < USERNAME_MIN {
            errors.add("username", ValidationErrorKind::MinLength, USERNAME_LENGTH_MESSAGE);
            return;
        }
        if len > USERNAME_MAX {
            errors.add("username", ValidationErrorKind::MaxLength, USERNAME_LENGTH_MESSAGE);
            return;
        }

        if let Some((kind, message)) = check_password(&self.password) {
            errors.add("password", kind, message);
            return;
        }

        let email_ok = email_regex().is_some_and(|re| re.is_match(&self.email));
        if !email_ok {
            errors.add("email", ValidationErrorKind::Pattern, EMAIL_MESSAGE);
        }
    }
}

fn check_password(password: &str) -> Option<(ValidationErrorKind, &'static str)> {
    let len = password.len();
    if len < PASSWORD_MIN {
        return Some((ValidationErrorKind::MinLength, PASSWORD_LENGTH_MESSAGE));
    }
    if len > PASSWORD_MAX {
        return Some((ValidationErrorKind::MaxLength, PASSWORD_LENGTH_MESSAGE));
    }

    let (mut number, mut upper, mut lower, mut special) = (false, false, false, false);
    for c in password.chars() {
        if c.is_numeric() {
            number = true;
        } else if c.is_uppercase() {
            upper = true;
        } else if c.is_lowercase() {
            lower = true;
        } else if c.is_ascii_punctuation() || is_symbol(c) {
            special = true;
        } else if c.is_whitespace() {
            return Some((ValidationErrorKind::Forbidden, PASSWORD_SPACES_MESSAGE));
        }
    }

    if number && upper && lower && special {
        None
    } else {
        Some((ValidationErrorKind::Required, PASSWORD_CLASSES_MESSAGE))
    }
}

// Non-ASCII punctuation and symbols (currency, math, dashes, ...).
fn is_symbol(c: char) -> bool {
    !c.is_ascii() && !c.is_alphanumeric() && !c.is_whitespace() && !c.is_control()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, email: &str, password: &str) -> RegisterUserRequest {
        RegisterUserRequest::new(username, email, password)
    }

    fn message(req: &RegisterUserRequest) -> String {
        match req.validate() {
            Ok(()) => String::new(),
            Err(Error::Validation(v)) => v.first_message().unwrap_or_default().to_string(),
            Err(other) => panic!("unexpected error kind: {other}"),
        }
    }

    #[test]
    fn accepts_a_valid_request() {
        assert!(
            request("alice", "alice@example.com", "Sup3r$ecret")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn username_bounds() {
        assert_eq!(message(&request("ab", "a@b.com", "Sup3r$ecret")), USERNAME_LENGTH_MESSAGE);
        assert_eq!(message(&request("abc", "a@b.com", "Sup3r$ecret")), "");
        assert_eq!(message(&request(&"a".repeat(63), "a@b.com", "Sup3r$ecret")), "");
        assert_eq!(
            message(&request(&"a".repeat(64), "a@b.com", "Sup3r$ecret")),
            USERNAME_LENGTH_MESSAGE
        );
    }

    #[test]
    fn password_length_bounds() {
        assert_eq!(message(&request("alice", "a@b.com", "Sh0r$t")), PASSWORD_LENGTH_MESSAGE);
        assert_eq!(message(&request("alice", "a@b.com", "Abcdef1!")), "");
        assert_eq!(message(&request("alice", "a@b.com", "Abcdefghijklm1!x")), "");
        assert_eq!(
            message(&request("alice", "a@b.com", "Abcdefghijklmn1!x")),
            PASSWORD_LENGTH_MESSAGE
        );
    }

    #[test]
    fn password_with_space_is_rejected() {
        assert_eq!(
            message(&request("alice", "a@b.com", "Abc def1!")),
            PASSWORD_SPACES_MESSAGE
        );
    }

    #[test]
    fn password_missing_a_class_is_rejected() {
        for pw in ["abcdef1!", "ABCDEF1!", "Abcdefg!", "Abcdefg1"] {
            assert_eq!(
                message(&request("alice", "a@b.com", pw)),
                PASSWORD_CLASSES_MESSAGE,
                "password {pw:?}"
            );
        }
    }

    #[test]
    fn non_ascii_symbols_count_as_special() {
        assert_eq!(message(&request("alice", "a@b.com", "Abcdef1€")), "");
    }

    #[test]
    fn invalid_email_is_rejected() {
        for email in ["", "alice", "alice@", "@example.com", "al ice@example.com"] {
            assert_eq!(
                message(&request("alice", email, "Sup3r$ecret")),
                EMAIL_MESSAGE,
                "email {email:?}"
            );
        }
    }

    #[test]
    fn email_with_display_name_is_accepted() {
        for email in [
            "Alice <alice@example.com>",
            "\"Alice Liddell\" <alice@example.com>",
            "<alice@example.com>",
        ] {
            assert_eq!(message(&request("alice", email, "Sup3r$ecret")), "", "email {email:?}");
        }
        for email in ["Alice <alice>", "Alice alice@example.com", "Alice <alice@example.com"] {
            assert_eq!(
                message(&request("alice", email, "Sup3r$ecret")),
                EMAIL_MESSAGE,
                "email {email:?}"
            );
        }
    }

    #[test]
    fn first_failure_wins() {
        let req = request("ab", "not-an-email", "short");
        let Err(Error::Validation(v)) = req.validate() else {
            panic!("expected validation error");
        };
        assert_eq!(v.errors.len(), 1);
        assert_eq!(v.errors[0].field, "username");
        assert_eq!(v.errors[0].kind, ValidationErrorKind::MinLength);
    }

    #[test]
    fn validation_errors_are_client_faults() {
        let err = request("alice", "bad", "Sup3r$ecret").validate().unwrap_err();
        assert_eq!(err.fault(), rowbind_core::Fault::Client);
    }

    #[test]
    fn deserializes_from_json() {
        let req: RegisterUserRequest = serde_json::from_str(
            r#"{"username":"alice","email":"alice@example.com","password":"Sup3r$ecret"}"#,
        )
        .unwrap();
        assert_eq!(req, request("alice", "alice@example.com", "Sup3r$ecret"));
    }
}
