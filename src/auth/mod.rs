//! Credential verification used by the HTTP surface.

pub mod credentials;

pub use credentials::{
    generate_password, Algorithm, Challenge, CredentialError, CredentialFile, Pbkdf2Hash,
};

/// Checks an (identity, secret) pair.
///
/// Implementations may be slow on purpose (key stretching), so callers on an
/// async runtime should invoke them from the blocking pool.
pub trait Verifier: Send + Sync + 'static {
    fn verify(&self, identity: &str, secret: &str) -> bool;
}
