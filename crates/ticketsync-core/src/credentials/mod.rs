//! Linked mailbox credentials and their sync ledger.
//!
//! Credentials are stored with the secret encrypted; [`SecretCipher`]
//! recovers it for the duration of one sync.

mod cipher;
mod model;
mod repository;

pub use cipher::SecretCipher;
pub use model::{AuditRow, AuditStatus, Credential, CredentialId, NewCredential};
pub use repository::CredentialRepository;
