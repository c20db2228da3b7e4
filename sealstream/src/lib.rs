//! SealStream: an authenticated, encrypted two-party session over any
//! async byte stream.
//!
//! The handshake and ciphers live in `sealtrust`; this crate moves their
//! messages over a transport, tracks the connection lifecycle and runs the
//! session channel once a key is agreed.

pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod session;
pub mod transport;

pub use config::SessionConfig;
pub use connection::{ConnectionState, StateChange};
pub use error::{ErrorKind, Result, SealStreamError};
pub use handshake::{NoopHook, Stage, StageHook};
pub use sealtrust::handshake::Role;
pub use session::{begin_handshake, SecurePipe, SessionHandle};
