//! Byte-stream transports a session can run over.
//!
//! Anything that is `AsyncRead + AsyncWrite` works: a TCP stream from
//! [`tcp`], or an in-process `tokio::io::duplex` pipe in tests.

pub mod tcp;

use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream a session can own.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased transport, used where the concrete stream type is chosen at
/// run time (TCP connect vs. accept).
pub type BoxedTransport = Box<dyn Transport>;
