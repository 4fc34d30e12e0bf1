//! Peer authentication, transport TLS and at-rest encryption.

pub mod auth;
pub mod encryption;
pub mod tls;

pub use auth::{ConnectionAuthenticator, PeerIdentity};
pub use encryption::{PayloadEncryptor, RecordSealer, KEY_LEN, NONCE_LEN};
pub use tls::{client_tls_config, server_tls_config};
