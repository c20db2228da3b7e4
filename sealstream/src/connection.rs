//! Connection lifecycle.
//!
//! Connecting -> Authenticating -> Established -> Closed
//!
//! Any state may drop to Failed (handshake or receive error) or Closed
//! (local close, peer hang-up, send failure). Both are terminal: the
//! transition happens once, emits one `StateChange`, and discards the
//! session key.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use sealtrust::{PassphraseCipher, SessionKey};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{ErrorKind, Result, SealStreamError};

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Transport is being set up.
    Connecting,
    /// Handshake in progress.
    Authenticating,
    /// Handshake complete; the session channel is usable.
    Established,
    /// The handshake or the session hit an error.
    Failed,
    /// The connection was closed.
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Authenticating => write!(f, "Authenticating"),
            ConnectionState::Established => write!(f, "Established"),
            ConnectionState::Failed => write!(f, "Failed"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

/// One observed lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub state: ConnectionState,
    /// Failure class, present when an error caused the transition.
    pub error_kind: Option<ErrorKind>,
    /// Human-readable cause, present when an error caused the transition.
    pub reason: Option<String>,
}

impl StateChange {
    fn plain(state: ConnectionState) -> Self {
        Self {
            state,
            error_kind: None,
            reason: None,
        }
    }
}

/// Key material for an established session.
pub(crate) struct SessionSecrets {
    session_key: SessionKey,
    cipher: PassphraseCipher,
}

impl SessionSecrets {
    pub(crate) fn new(session_key: SessionKey) -> Self {
        let cipher = PassphraseCipher::new(session_key.as_decimal());
        Self {
            session_key,
            cipher,
        }
    }

    pub(crate) fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    pub(crate) fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(self.cipher.encrypt(plaintext)?)
    }

    pub(crate) fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(self.cipher.decrypt(ciphertext)?)
    }
}

struct Inner {
    state: ConnectionState,
    secrets: Option<Arc<SessionSecrets>>,
}

/// Shared, lock-guarded lifecycle of one connection.
pub(crate) struct Lifecycle {
    inner: Mutex<Inner>,
    events: mpsc::UnboundedSender<StateChange>,
}

impl Lifecycle {
    /// Start in `Connecting` and return the receiver for transitions.
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<StateChange>) {
        let (events, rx) = mpsc::unbounded_channel();
        let lifecycle = Self {
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                secrets: None,
            }),
            events,
        };
        lifecycle.emit(StateChange::plain(ConnectionState::Connecting));
        (lifecycle, rx)
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Move to `Authenticating`.
    pub(crate) fn authenticating(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Connecting {
            return Err(SealStreamError::NotEstablished {
                state: inner.state.to_string(),
            });
        }
        inner.state = ConnectionState::Authenticating;
        self.emit(StateChange::plain(ConnectionState::Authenticating));
        Ok(())
    }

    /// Install the session key and move to `Established`.
    pub(crate) fn establish(&self, secrets: SessionSecrets) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Authenticating {
            return Err(SealStreamError::NotEstablished {
                state: inner.state.to_string(),
            });
        }
        inner.state = ConnectionState::Established;
        inner.secrets = Some(Arc::new(secrets));
        info!("session established");
        self.emit(StateChange::plain(ConnectionState::Established));
        Ok(())
    }

    /// Key material, available only while `Established`.
    pub(crate) fn secrets(&self) -> Result<Arc<SessionSecrets>> {
        let inner = self.inner.lock();
        match (&inner.state, &inner.secrets) {
            (ConnectionState::Established, Some(secrets)) => Ok(Arc::clone(secrets)),
            (state, _) => Err(SealStreamError::NotEstablished {
                state: state.to_string(),
            }),
        }
    }

    /// Enter a terminal state. Returns false if already terminal, in which
    /// case nothing is emitted.
    pub(crate) fn terminate(&self, to: ConnectionState, cause: Option<&SealStreamError>) -> bool {
        debug_assert!(to.is_terminal());
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return false;
        }
        let from = inner.state;
        inner.state = to;
        inner.secrets = None;
        debug!(%from, %to, "connection terminated");
        self.emit(StateChange {
            state: to,
            error_kind: cause.map(SealStreamError::kind),
            reason: cause.map(ToString::to_string),
        });
        true
    }

    fn emit(&self, change: StateChange) {
        // The observer may have gone away; transitions still apply.
        let _ = self.events.send(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_emits_each_state_once() {
        let (lc, mut rx) = Lifecycle::new();
        lc.authenticating().unwrap();
        let mut i = sealtrust::Initiator::new("k");
        let mut r = sealtrust::Responder::new("k");
        let r1 = r.process_begin(&i.create_begin().unwrap()).unwrap();
        let r2 = i.process_response1(&r1).unwrap();
        let key = r.process_response2(&r2).unwrap().clone();
        lc.establish(SessionSecrets::new(key)).unwrap();
        assert!(lc.terminate(ConnectionState::Closed, None));
        assert!(!lc.terminate(ConnectionState::Failed, None));

        let states: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).map(|c| c.state).collect();
        assert_eq!(
            states,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Authenticating,
                ConnectionState::Established,
                ConnectionState::Closed,
            ]
        );
        assert!(lc.secrets().is_err());
    }

    #[test]
    fn failure_carries_kind_and_reason() {
        let (lc, mut rx) = Lifecycle::new();
        let err = SealStreamError::ConnectionClosed;
        lc.terminate(ConnectionState::Failed, Some(&err));
        let _connecting = rx.try_recv().unwrap();
        let failed = rx.try_recv().unwrap();
        assert_eq!(failed.state, ConnectionState::Failed);
        assert_eq!(failed.error_kind, Some(ErrorKind::Transport));
        assert_eq!(failed.reason.as_deref(), Some("connection is closed"));
    }

    #[test]
    fn cannot_establish_after_failure() {
        let (lc, _rx) = Lifecycle::new();
        lc.terminate(ConnectionState::Failed, None);
        assert!(lc.authenticating().is_err());
    }
}
