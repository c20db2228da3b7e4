//! TCP transport: dial out as the initiator, or accept exactly one peer as
//! the responder.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{Result, SealStreamError};

/// Connect to `address:port`, failing after `connect_timeout`.
pub async fn connect(address: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream> {
    debug!(%address, port, "connecting");
    let stream = timeout(connect_timeout, TcpStream::connect((address, port)))
        .await
        .map_err(|_| SealStreamError::Timeout("connect", connect_timeout))??;
    stream.set_nodelay(true)?;
    info!(peer = %stream.peer_addr()?, "connected");
    Ok(stream)
}

/// Bind a listener on all interfaces at `port`. Port 0 picks a free port.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(local = %listener.local_addr()?, "listening");
    Ok(listener)
}

/// Accept one peer and stop listening.
pub async fn accept_one(listener: TcpListener) -> Result<TcpStream> {
    let (stream, peer) = listener.accept().await?;
    stream.set_nodelay(true)?;
    info!(%peer, "accepted");
    Ok(stream)
}

/// Listen on `port` and block until exactly one peer connects.
pub async fn listen_and_accept(port: u16) -> Result<TcpStream> {
    accept_one(bind(port).await?).await
}
