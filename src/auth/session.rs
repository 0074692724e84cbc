//! Signed client-side session and flash cookies
//!
//! Tokens are `base64url(json payload) "." base64url(hmac-sha256)`. A token
//! whose signature does not verify, whose payload does not parse or whose
//! session has expired is treated exactly like a missing cookie.

use std::time::Duration;

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "mediavault_session";

/// Cookie carrying pending flash messages
pub const FLASH_COOKIE: &str = "mediavault_flash";

/// Session claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub authenticated: bool,
    /// Unix seconds at login
    pub issued_at: i64,
}

impl Session {
    pub fn authenticated() -> Self {
        Self {
            authenticated: true,
            issued_at: Utc::now().timestamp(),
        }
    }
}

/// Severity of a flash message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Error,
}

/// One-shot message shown on the next rendered page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self { level: FlashLevel::Success, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: FlashLevel::Error, message: message.into() }
    }
}

/// Signs and verifies session and flash cookies
#[derive(Clone)]
pub struct SessionSigner {
    secret: Vec<u8>,
    ttl: Duration,
    secure: bool,
}

impl SessionSigner {
    pub fn new(secret: &[u8], ttl: Duration, secure: bool) -> Self {
        Self {
            secret: secret.to_vec(),
            ttl,
            secure,
        }
    }

    fn mac(&self) -> HmacSha256 {
        <HmacSha256 as Mac>::new_from_slice(&self.secret).expect("HMAC accepts keys of any length")
    }

    /// Serialize and sign a payload
    pub fn sign<T: Serialize>(&self, payload: &T) -> Result<String> {
        let json = serde_json::to_vec(payload)
            .map_err(|e| Error::Session(format!("cannot encode payload: {}", e)))?;
        let body = URL_SAFE_NO_PAD.encode(json);

        let mut mac = self.mac();
        mac.update(body.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", body, signature))
    }

    /// Verify a token and decode its payload
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        let (body, signature) = token
            .split_once('.')
            .ok_or_else(|| Error::Session("malformed token".into()))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| Error::Session("malformed signature".into()))?;

        let mut mac = self.mac();
        mac.update(body.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| Error::Session("bad signature".into()))?;

        let json = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| Error::Session("malformed payload".into()))?;
        serde_json::from_slice(&json).map_err(|e| Error::Session(format!("invalid payload: {}", e)))
    }

    /// Whether the request carries a valid, unexpired, authenticated session
    pub fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        let Some(token) = read_cookie(headers, SESSION_COOKIE) else {
            return false;
        };
        match self.verify::<Session>(&token) {
            Ok(session) => session.authenticated && !self.is_expired(&session),
            Err(e) => {
                tracing::debug!("Ignoring session cookie: {}", e);
                false
            }
        }
    }

    fn is_expired(&self, session: &Session) -> bool {
        let age = Utc::now().timestamp() - session.issued_at;
        age < 0 || age as u64 > self.ttl.as_secs()
    }

    /// Pending flash messages (invalid cookies yield none)
    pub fn read_flashes(&self, headers: &HeaderMap) -> Vec<Flash> {
        read_cookie(headers, FLASH_COOKIE)
            .and_then(|token| self.verify(&token).ok())
            .unwrap_or_default()
    }

    /// `Set-Cookie` value starting a new authenticated session
    pub fn login_cookie(&self) -> Result<String> {
        let token = self.sign(&Session::authenticated())?;
        Ok(self.cookie(SESSION_COOKIE, &token, self.ttl.as_secs()))
    }

    /// `Set-Cookie` value ending the session
    pub fn logout_cookie(&self) -> String {
        self.cookie(SESSION_COOKIE, "", 0)
    }

    /// `Set-Cookie` value carrying flash messages for the next page
    pub fn flash_cookie(&self, flashes: &[Flash]) -> Result<String> {
        let token = self.sign(&flashes)?;
        Ok(self.cookie(FLASH_COOKIE, &token, 300))
    }

    /// `Set-Cookie` value dropping consumed flash messages
    pub fn clear_flash_cookie(&self) -> String {
        self.cookie(FLASH_COOKIE, "", 0)
    }

    fn cookie(&self, name: &str, value: &str, max_age: u64) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            name, value, max_age
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Read one cookie value from the request headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
