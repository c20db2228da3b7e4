// SealTrust - pre-shared-secret mutual authentication, key agreement and cipher layer
//
// Crate root: module declarations and public re-exports.

pub mod error;
pub mod crypto;
pub mod handshake;

// Re-export key types at crate root for convenience.
pub use error::{SealTrustError, Result};
pub use crypto::cipher::PassphraseCipher;
pub use crypto::dh::{PartialKey, SessionKey};
pub use handshake::protocol::{Initiator, Responder};
pub use handshake::Role;
