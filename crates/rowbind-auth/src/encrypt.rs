//! Password salting and encryption.
//!
//! Passwords are stored encrypted, not hashed: the key is
//! `PBKDF2-HMAC-SHA256(pepper, salt)` and the cipher is AES-256-GCM with a
//! random 96-bit nonce. A stored value is `base64(nonce) "-" base64(ciphertext)`.
//! The salt is random per user and stored next to the ciphertext; the pepper
//! is a server secret from [`EncryptConfig`](crate::config::EncryptConfig)
//! and is never stored.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::Hmac;
use rand::{Rng, thread_rng};
use rowbind_core::Error;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Default PBKDF2 round count.
pub const DEFAULT_ITERATIONS: u32 = 65_536;

/// Length of a generated salt.
pub const SALT_LENGTH: usize = 64;

pub const ENCRYPT_FAILED_MESSAGE: &str = "Failed to encrypt password";
pub const DECRYPT_FAILED_MESSAGE: &str = "Failed to decrypt password";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const SEPARATOR: char = '-';

// No lowercase 'e'. Existing salts were drawn from this exact set.
const LETTERS: &str = "abcdfghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const NUMBERS: &str = "0123456789";
const SYMBOLS: &str = "!@#$%&*+_-=";

/// Produces salts and encrypts passwords.
pub trait PasswordEncryptor: Send + Sync {
    /// Random string of `length` characters. Letters are always drawn from;
    /// digits and symbols only when asked for.
    fn generate_salt(&self, length: usize, numbers: bool, symbols: bool) -> String;

    /// Encrypt `password` under a key derived from `salt` and the server
    /// `pepper`.
    ///
    /// An empty password encrypts to an empty string.
    fn encrypt(&self, password: &str, salt: &str, pepper: &str) -> Result<String, Error>;

    /// Recover the password from a value produced by [`encrypt`](Self::encrypt).
    ///
    /// An empty value decrypts to an empty password.
    fn decrypt(&self, encrypted: &str, salt: &str, pepper: &str) -> Result<String, Error>;
}

/// AES-256-GCM encryptor keyed by PBKDF2-HMAC-SHA256.
#[derive(Debug, Clone, Copy)]
pub struct AesGcmEncryptor {
    iterations: u32,
}

impl AesGcmEncryptor {
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    fn cipher(&self, salt: &str, pepper: &str, message: &str) -> Result<Aes256Gcm, Error> {
        if self.iterations == 0 {
            return Err(failure(message, "iteration count must be positive"));
        }
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2::<HmacSha256>(pepper.as_bytes(), salt.as_bytes(), self.iterations, &mut key)
            .map_err(|e| failure(message, e))?;
        Aes256Gcm::new_from_slice(&key).map_err(|e| failure(message, e))
    }
}

impl Default for AesGcmEncryptor {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl PasswordEncryptor for AesGcmEncryptor {
    fn generate_salt(&self, length: usize, numbers: bool, symbols: bool) -> String {
        let mut alphabet = String::from(LETTERS);
        if numbers {
            alphabet.push_str(NUMBERS);
        }
        if symbols {
            alphabet.push_str(SYMBOLS);
        }
        let chars = alphabet.as_bytes();

        let mut rng = thread_rng();
        (0..length)
            .map(|_| char::from(chars[rng.gen_range(0..chars.len())]))
            .collect()
    }

    fn encrypt(&self, password: &str, salt: &str, pepper: &str) -> Result<String, Error> {
        if password.is_empty() {
            return Ok(String::new());
        }
        let cipher = self.cipher(salt, pepper, ENCRYPT_FAILED_MESSAGE)?;

        let mut nonce = [0u8; NONCE_LEN];
        thread_rng().fill(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), password.as_bytes())
            .map_err(|e| failure(ENCRYPT_FAILED_MESSAGE, e))?;

        Ok(format!(
            "{}{}{}",
            BASE64.encode(nonce),
            SEPARATOR,
            BASE64.encode(ciphertext)
        ))
    }

    fn decrypt(&self, encrypted: &str, salt: &str, pepper: &str) -> Result<String, Error> {
        if encrypted.is_empty() {
            return Ok(String::new());
        }
        // The base64 alphabet has no '-', so the first one is the separator.
        let (nonce, ciphertext) = encrypted
            .split_once(SEPARATOR)
            .ok_or_else(|| failure(DECRYPT_FAILED_MESSAGE, "missing nonce separator"))?;
        let nonce = BASE64
            .decode(nonce)
            .map_err(|e| failure(DECRYPT_FAILED_MESSAGE, e))?;
        if nonce.len() != NONCE_LEN {
            return Err(failure(
                DECRYPT_FAILED_MESSAGE,
                format!("nonce is {} bytes, expected {}", nonce.len(), NONCE_LEN),
            ));
        }
        let ciphertext = BASE64
            .decode(ciphertext)
            .map_err(|e| failure(DECRYPT_FAILED_MESSAGE, e))?;

        let cipher = self.cipher(salt, pepper, DECRYPT_FAILED_MESSAGE)?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|e| failure(DECRYPT_FAILED_MESSAGE, e))?;
        String::from_utf8(plaintext).map_err(|e| failure(DECRYPT_FAILED_MESSAGE, e))
    }
}

fn failure(message: &str, cause: impl std::fmt::Display) -> Error {
    Error::Custom(format!("{}: {}", message, cause))
}

/// Check `password` against a stored value in constant time.
///
/// A stored value that does not decrypt with this salt and pepper does not
/// match; it is not an error.
pub fn verify_password(
    encryptor: &dyn PasswordEncryptor,
    password: &str,
    salt: &str,
    pepper: &str,
    stored: &str,
) -> bool {
    match encryptor.decrypt(stored, salt, pepper) {
        Ok(plain) => plain.as_bytes().ct_eq(password.as_bytes()).into(),
        Err(e) => {
            tracing::debug!(error = %e, "stored password did not decrypt");
            false
        }
    }
}
