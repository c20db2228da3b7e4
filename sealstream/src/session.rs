//! Secure Session Channel.
//!
//! A `SecurePipe` owns one connection attempt: it obtains a transport,
//! drives the handshake under a timeout and, on success, hands back a
//! `SessionHandle`. The handle splits the transport: sends go through a
//! lock-guarded writer from any task, and a dedicated receive task reads
//! frames, decrypts them and forwards plaintext to the inbound channel.
//!
//! Decrypted payloads keep their zero padding. The cipher has no length
//! field, so trailing zeros in a message cannot be told apart from padding.

use std::sync::Arc;

use bytes::Bytes;
use sealtrust::handshake::Role;
use sealtrust::SessionKey;
use tokio::io::{self, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::SessionConfig;
use crate::connection::{ConnectionState, Lifecycle, SessionSecrets, StateChange};
use crate::error::{Result, SealStreamError};
use crate::frame::{read_frame, write_frame};
use crate::handshake::{self, NoopHook, StageHook};
use crate::transport::{tcp, BoxedTransport, Transport};

/// One connection attempt, from transport setup through handshake.
pub struct SecurePipe {
    role: Role,
    secret: Zeroizing<String>,
    config: SessionConfig,
    hook: Arc<dyn StageHook>,
    lifecycle: Arc<Lifecycle>,
    states: Option<mpsc::UnboundedReceiver<StateChange>>,
}

impl SecurePipe {
    /// Create a pipe in the `Connecting` state.
    pub fn new(role: Role, secret: impl Into<String>, config: SessionConfig) -> Self {
        let (lifecycle, states) = Lifecycle::new();
        Self {
            role,
            secret: Zeroizing::new(secret.into()),
            config,
            hook: Arc::new(NoopHook),
            lifecycle: Arc::new(lifecycle),
            states: Some(states),
        }
    }

    /// Run `hook` before every handshake stage.
    pub fn with_hook(mut self, hook: impl StageHook + 'static) -> Self {
        self.hook = Arc::new(hook);
        self
    }

    /// Take the state-transition stream before opening, to observe
    /// `Connecting` and `Authenticating` as they happen. If not taken here
    /// it is handed to the resulting `SessionHandle`.
    pub fn states(&mut self) -> Option<mpsc::UnboundedReceiver<StateChange>> {
        self.states.take()
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Open a TCP transport for this role and run the handshake over it.
    ///
    /// The initiator dials `address:port`; the responder listens on `port`
    /// and accepts exactly one peer.
    pub async fn open(self) -> Result<SessionHandle> {
        let guard = AttemptGuard::new(&self.lifecycle);
        let connected = match self.role {
            Role::Initiator => tcp::connect(
                &self.config.address,
                self.config.port,
                self.config.connect_timeout(),
            )
            .await
            .map(|s| Box::new(s) as BoxedTransport),
            Role::Responder => tcp::listen_and_accept(self.config.port)
                .await
                .map(|s| Box::new(s) as BoxedTransport),
        };
        let result = match connected {
            Ok(transport) => self.run(transport).await,
            Err(e) => {
                warn!(error = %e, "transport setup failed");
                self.lifecycle.terminate(ConnectionState::Failed, Some(&e));
                Err(e)
            }
        };
        guard.disarm();
        result
    }

    /// Run the handshake over an already-connected transport.
    pub async fn run<T: Transport>(self, transport: T) -> Result<SessionHandle> {
        let mut transport: BoxedTransport = Box::new(transport);
        let guard = AttemptGuard::new(&self.lifecycle);
        self.lifecycle.authenticating()?;
        info!(role = %self.role, "handshake started");

        let limit = self.config.handshake_timeout();
        let outcome = timeout(
            limit,
            handshake::run(self.role, &mut transport, &self.secret, self.hook.as_ref()),
        )
        .await
        .unwrap_or(Err(SealStreamError::Timeout("handshake", limit)));

        let session_key = match outcome {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, kind = %e.kind(), "handshake failed");
                self.lifecycle.terminate(ConnectionState::Failed, Some(&e));
                let _ = transport.shutdown().await;
                return Err(e);
            }
        };

        self.lifecycle.establish(SessionSecrets::new(session_key))?;
        guard.disarm();
        Ok(SessionHandle::spawn(
            transport,
            self.lifecycle,
            self.states,
            &self.config,
        ))
    }
}

/// Closes the lifecycle if a connection attempt is dropped before it
/// finishes, so observers always see a terminal state.
struct AttemptGuard {
    lifecycle: Arc<Lifecycle>,
    armed: bool,
}

impl AttemptGuard {
    fn new(lifecycle: &Arc<Lifecycle>) -> Self {
        Self {
            lifecycle: Arc::clone(lifecycle),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        if self.armed && self.lifecycle.terminate(ConnectionState::Closed, None) {
            debug!("connection attempt abandoned");
        }
    }
}

/// Run the handshake for `role` over `transport` and return a live session.
pub async fn begin_handshake<T: Transport>(
    transport: T,
    role: Role,
    secret: &str,
    config: &SessionConfig,
) -> Result<SessionHandle> {
    SecurePipe::new(role, secret, config.clone()).run(transport).await
}

// ── Established session ──────────────────────────────────────────────────

struct Shared {
    lifecycle: Arc<Lifecycle>,
    writer: Mutex<Option<WriteHalf<BoxedTransport>>>,
    closed: watch::Sender<bool>,
}

impl Shared {
    /// Raise the close signal. Pending reads and writes abandon their I/O.
    fn signal_closed(&self) {
        self.closed.send_replace(true);
    }

    /// Resolves once the close signal is raised.
    async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Enter `to` once, stop the receive task and shut the writer down.
    ///
    /// The signal goes up before the writer lock is taken; a blocked send
    /// releases the lock when it sees the signal.
    async fn teardown(&self, to: ConnectionState, cause: Option<&SealStreamError>) {
        if !self.lifecycle.terminate(to, cause) {
            return;
        }
        self.signal_closed();
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let _ = writer.shutdown().await;
        }
        debug!(state = %to, "session torn down");
    }
}

/// A live, authenticated session.
///
/// Dropping the handle closes the session.
pub struct SessionHandle {
    shared: Arc<Shared>,
    inbound: Option<mpsc::Receiver<Bytes>>,
    states: Option<mpsc::UnboundedReceiver<StateChange>>,
    receiver: JoinHandle<()>,
}

impl SessionHandle {
    fn spawn(
        transport: BoxedTransport,
        lifecycle: Arc<Lifecycle>,
        states: Option<mpsc::UnboundedReceiver<StateChange>>,
        config: &SessionConfig,
    ) -> Self {
        let (reader, writer) = io::split(transport);
        let shared = Arc::new(Shared {
            lifecycle,
            writer: Mutex::new(Some(writer)),
            closed: watch::channel(false).0,
        });
        let (tx, rx) = mpsc::channel(config.inbound_capacity.max(1));
        let receiver = tokio::spawn(receive_loop(
            reader,
            Arc::clone(&shared),
            tx,
            config.max_frame_len,
        ));
        Self {
            shared,
            inbound: Some(rx),
            states,
            receiver,
        }
    }

    /// Encrypt `plaintext` under the session key and send it as one frame.
    ///
    /// A write failure closes the session.
    pub async fn send(&self, plaintext: &[u8]) -> Result<()> {
        let secrets = self.shared.lifecycle.secrets()?;
        let ciphertext = secrets.encrypt(plaintext)?;

        let written = tokio::select! {
            _ = self.shared.closed() => Err(SealStreamError::ConnectionClosed),
            written = async {
                let mut guard = self.shared.writer.lock().await;
                match guard.as_mut() {
                    Some(writer) => write_frame(writer, &ciphertext).await,
                    None => Err(SealStreamError::ConnectionClosed),
                }
            } => written,
        };
        if let Err(e) = written {
            warn!(error = %e, "send failed");
            self.shared.teardown(ConnectionState::Closed, Some(&e)).await;
            return Err(e);
        }
        debug!(plaintext_len = plaintext.len(), frame_len = ciphertext.len(), "message sent");
        Ok(())
    }

    /// Next decrypted inbound message, or `None` once the session has ended
    /// and all buffered messages are drained.
    ///
    /// Returns `None` immediately if the inbound stream was taken.
    pub async fn recv(&mut self) -> Option<Bytes> {
        match self.inbound.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Take the inbound message stream, e.g. to consume it on another task.
    pub fn inbound(&mut self) -> Option<mpsc::Receiver<Bytes>> {
        self.inbound.take()
    }

    /// Take the state-transition stream, if the pipe did not hand it out.
    pub fn states(&mut self) -> Option<mpsc::UnboundedReceiver<StateChange>> {
        self.states.take()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lifecycle.state()
    }

    /// The agreed session key, while the session is established.
    pub fn session_key(&self) -> Result<SessionKey> {
        let secrets = self.shared.lifecycle.secrets()?;
        Ok(secrets.session_key().clone())
    }

    /// Close the session. Calling it again has no effect.
    pub async fn close(&self) {
        self.shared.teardown(ConnectionState::Closed, None).await;
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.shared.lifecycle.terminate(ConnectionState::Closed, None) {
            self.shared.signal_closed();
        }
        self.receiver.abort();
    }
}

async fn receive_loop(
    mut reader: ReadHalf<BoxedTransport>,
    shared: Arc<Shared>,
    inbound: mpsc::Sender<Bytes>,
    max_frame_len: usize,
) {
    loop {
        let read = tokio::select! {
            _ = shared.closed() => break,
            read = read_frame(&mut reader, max_frame_len) => read,
        };
        let plaintext = read.and_then(|ciphertext| {
            let secrets = shared.lifecycle.secrets()?;
            secrets.decrypt(&ciphertext)
        });

        match plaintext {
            Ok(plaintext) => {
                debug!(len = plaintext.len(), "message received");
                tokio::select! {
                    _ = shared.closed() => break,
                    sent = inbound.send(Bytes::from(plaintext)) => {
                        if sent.is_err() {
                            debug!("inbound receiver dropped; discarding message");
                        }
                    }
                }
            }
            Err(SealStreamError::ConnectionClosed) => {
                info!("peer closed the connection");
                shared.teardown(ConnectionState::Closed, None).await;
                break;
            }
            Err(e) => {
                warn!(error = %e, kind = %e.kind(), "receive failed");
                shared.teardown(ConnectionState::Failed, Some(&e)).await;
                break;
            }
        }
    }
    debug!("receive loop stopped");
}
