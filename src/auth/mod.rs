//! Authentication gate and credential storage.

pub mod credentials;
pub mod digest;
pub mod password;

pub use credentials::{Credential, CredentialStore};
pub use digest::{DigestAlgorithm, DigestAuth, DigestParams};
pub use password::{hash_password, hash_with_salt, verify_password};
