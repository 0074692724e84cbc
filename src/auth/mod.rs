//! Login and session handling
//!
//! One shared account, checked by the [`CredentialGate`], and a signed
//! cookie session produced by the [`SessionSigner`].

mod credentials;
mod session;

pub use credentials::{CredentialGate, PasswordHash};
pub use session::{read_cookie, Flash, FlashLevel, Session, SessionSigner, FLASH_COOKIE, SESSION_COOKIE};
