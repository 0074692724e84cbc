//! Single-account credential check

use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

pub const SALT_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Salted password hash.
///
/// The password is stretched with PBKDF2-HMAC-SHA256 and the derived key
/// authenticates the salt; verification recomputes the tag and compares it
/// through `Mac::verify_slice`, which runs in constant time.
#[derive(Clone)]
pub struct PasswordHash {
    salt: [u8; SALT_LEN],
    rounds: u32,
    tag: Vec<u8>,
}

impl PasswordHash {
    /// Hash `password` with a fresh random salt
    pub fn generate(password: &str, rounds: u32) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let tag = Self::mac(password, &salt, rounds).finalize().into_bytes().to_vec();
        Self { salt, rounds, tag }
    }

    pub fn verify(&self, password: &str) -> bool {
        Self::mac(password, &self.salt, self.rounds)
            .verify_slice(&self.tag)
            .is_ok()
    }

    fn mac(password: &str, salt: &[u8], rounds: u32) -> HmacSha256 {
        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut key);
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&key)
            .expect("HMAC accepts keys of any length");
        mac.update(salt);
        mac
    }
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHash")
            .field("rounds", &self.rounds)
            .finish_non_exhaustive()
    }
}

/// Verifies the one configured username/password pair
#[derive(Debug, Clone)]
pub struct CredentialGate {
    username: String,
    password: PasswordHash,
}

impl CredentialGate {
    /// Build the gate; the plaintext password is hashed and dropped
    pub fn new(username: impl Into<String>, password: &str, rounds: u32) -> Self {
        Self {
            username: username.into(),
            password: PasswordHash::generate(password, rounds),
        }
    }

    /// True only when both the username and the password match. The
    /// password hash is always checked so a wrong username takes as long
    /// as a wrong password.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let password_ok = self.password.verify(password);
        let username_ok = username == self.username;
        username_ok && password_ok
    }
}
