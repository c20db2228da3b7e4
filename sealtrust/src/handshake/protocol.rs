// SealTrust handshake protocol: 3-message mutual authentication over a
// pre-shared secret, with a finite-field DH exchange riding inside the
// encrypted proofs.
//
//   Initiator                                   Responder
//     |--- Begin(R_A) ------------------------------>|
//     |<-- Response1(R_B, E(SRVR || R_A || g^b)) ----|
//     |--- Response2(E(R_B || g^a)) ---------------->|
//     |==== cipher keyed by decimal(g^ab mod p) =====|
//
// Both types are sans-IO: they consume and produce messages, and the
// caller moves bytes. Any error is terminal and leaves the state Failed.

use std::mem;

use tracing::{debug, trace};

use crate::crypto::cipher::PassphraseCipher;
use crate::crypto::dh::{DhParameters, Exponent, SessionKey};
use crate::crypto::hash::short_hex;
use crate::error::{Result, SealTrustError};
use crate::handshake::messages::{
    Begin, Challenge, ClientProof, Response1, Response2, ServerProof, SERVER_TAG,
};
use crate::handshake::state::{InitiatorState, ResponderState};

// ── Initiator ────────────────────────────────────────────────────────────

/// Client-side (connecting) half of the handshake.
pub struct Initiator {
    cipher: PassphraseCipher,
    params: DhParameters,
    state: InitiatorState,
}

impl Initiator {
    /// Create an initiator holding the pre-shared secret.
    pub fn new(secret: &str) -> Self {
        Self {
            cipher: PassphraseCipher::new(secret),
            params: DhParameters::default(),
            state: InitiatorState::Idle,
        }
    }

    pub fn state(&self) -> &InitiatorState {
        &self.state
    }

    /// Step 1: generate R_A and produce `Begin`.
    pub fn create_begin(&mut self) -> Result<Begin> {
        self.ensure_idle()?;
        let challenge = self.fail_on_err(Challenge::generate())?;
        Ok(self.send_begin(challenge))
    }

    /// Step 1 with a caller-chosen challenge.
    pub fn create_begin_with_challenge(&mut self, challenge: Challenge) -> Result<Begin> {
        self.ensure_idle()?;
        Ok(self.send_begin(challenge))
    }

    /// Step 2: verify `Response1` and produce `Response2`.
    ///
    /// The responder proves knowledge of the secret by returning R_A
    /// encrypted under it, followed by the "SRVR" tag check. Either
    /// mismatch is an authentication failure.
    pub fn process_response1(&mut self, response: &Response1) -> Result<Response2> {
        let expected = match mem::replace(&mut self.state, InitiatorState::Failed) {
            InitiatorState::BeginSent { challenge } => challenge,
            other => {
                let from = other.label();
                self.state = other;
                return Err(SealTrustError::InvalidStateTransition {
                    from: from.into(),
                    to: "Verified".into(),
                });
            }
        };

        let plaintext = self.cipher.decrypt(&response.blob)?;
        let proof = ServerProof::decode(&plaintext)?;

        if proof.echoed_challenge != expected {
            debug!("response1: echoed challenge mismatch");
            return Err(SealTrustError::Authentication(
                "responder did not echo our challenge".into(),
            ));
        }
        if proof.tag != SERVER_TAG {
            debug!("response1: server tag mismatch");
            return Err(SealTrustError::Authentication(
                "responder proof is missing the server tag".into(),
            ));
        }
        trace!(peer_partial_key = %short_hex(proof.partial_key.as_bytes()), "response1 verified");

        let exponent = Exponent::generate()?;
        let own_partial_key = self.params.partial_key(&exponent);
        let reply = ClientProof {
            echoed_challenge: response.challenge.clone(),
            partial_key: own_partial_key,
        };
        let blob = self.cipher.encrypt(&reply.encode())?;

        self.state = InitiatorState::Verified {
            exponent,
            peer_partial_key: proof.partial_key,
        };
        Ok(Response2 { blob })
    }

    /// Step 3: derive the session key once `Response2` has been sent.
    pub fn finish(&mut self) -> Result<&SessionKey> {
        match mem::replace(&mut self.state, InitiatorState::Failed) {
            InitiatorState::Verified {
                exponent,
                peer_partial_key,
            } => {
                let session_key = self.params.shared_key(&peer_partial_key, &exponent);
                debug!("initiator derived session key");
                self.state = InitiatorState::Established { session_key };
            }
            other => {
                let from = other.label();
                self.state = other;
                return Err(SealTrustError::InvalidStateTransition {
                    from: from.into(),
                    to: "Established".into(),
                });
            }
        }
        self.session_key()
            .ok_or_else(|| SealTrustError::InvalidStateTransition {
                from: "Failed".into(),
                to: "Established".into(),
            })
    }

    /// The derived session key, available only once established.
    pub fn session_key(&self) -> Option<&SessionKey> {
        match &self.state {
            InitiatorState::Established { session_key } => Some(session_key),
            _ => None,
        }
    }

    /// Consume the initiator, yielding the session key if established.
    pub fn into_session_key(mut self) -> Option<SessionKey> {
        match mem::replace(&mut self.state, InitiatorState::Failed) {
            InitiatorState::Established { session_key } => Some(session_key),
            _ => None,
        }
    }

    pub fn is_established(&self) -> bool {
        matches!(self.state, InitiatorState::Established { .. })
    }

    fn ensure_idle(&self) -> Result<()> {
        if matches!(self.state, InitiatorState::Idle) {
            Ok(())
        } else {
            Err(SealTrustError::InvalidStateTransition {
                from: self.state.label().into(),
                to: "BeginSent".into(),
            })
        }
    }

    fn send_begin(&mut self, challenge: Challenge) -> Begin {
        trace!(challenge = %short_hex(challenge.as_bytes()), "begin");
        self.state = InitiatorState::BeginSent {
            challenge: challenge.clone(),
        };
        Begin { challenge }
    }

    fn fail_on_err<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.state = InitiatorState::Failed;
        }
        result
    }
}

// ── Responder ────────────────────────────────────────────────────────────

/// Server-side (listening) half of the handshake.
pub struct Responder {
    cipher: PassphraseCipher,
    params: DhParameters,
    state: ResponderState,
}

impl Responder {
    pub fn new(secret: &str) -> Self {
        Self {
            cipher: PassphraseCipher::new(secret),
            params: DhParameters::default(),
            state: ResponderState::Idle,
        }
    }

    pub fn state(&self) -> &ResponderState {
        &self.state
    }

    /// Step 1 (responder side): answer `Begin` with `Response1`.
    ///
    /// Nothing in `Begin` can be checked; the initiator is authenticated
    /// later by echoing R_B in `Response2`.
    pub fn process_begin(&mut self, begin: &Begin) -> Result<Response1> {
        if !matches!(self.state, ResponderState::Idle) {
            return Err(SealTrustError::InvalidStateTransition {
                from: self.state.label().into(),
                to: "Response1Sent".into(),
            });
        }
        self.state = ResponderState::Failed;

        let challenge = Challenge::generate()?;
        let exponent = Exponent::generate()?;
        let proof = ServerProof::new(begin.challenge.clone(), self.params.partial_key(&exponent));
        let blob = self.cipher.encrypt(&proof.encode())?;
        trace!(challenge = %short_hex(challenge.as_bytes()), "response1");

        self.state = ResponderState::Response1Sent {
            challenge: challenge.clone(),
            exponent,
        };
        Ok(Response1 { challenge, blob })
    }

    /// Step 2 (responder side): verify `Response2` and derive the key.
    pub fn process_response2(&mut self, response: &Response2) -> Result<&SessionKey> {
        self.verify_response2(response)?;
        self.finish()
    }

    /// Check that the initiator echoed R_B. The key is not derived yet.
    pub fn verify_response2(&mut self, response: &Response2) -> Result<()> {
        let (expected, exponent) = match mem::replace(&mut self.state, ResponderState::Failed) {
            ResponderState::Response1Sent {
                challenge,
                exponent,
            } => (challenge, exponent),
            other => {
                let from = other.label();
                self.state = other;
                return Err(SealTrustError::InvalidStateTransition {
                    from: from.into(),
                    to: "Verified".into(),
                });
            }
        };

        let plaintext = self.cipher.decrypt(&response.blob)?;
        let proof = ClientProof::decode(&plaintext)?;
        if proof.echoed_challenge != expected {
            debug!("response2: echoed challenge mismatch");
            return Err(SealTrustError::Authentication(
                "initiator did not echo our challenge".into(),
            ));
        }
        trace!(peer_partial_key = %short_hex(proof.partial_key.as_bytes()), "response2 verified");

        self.state = ResponderState::Verified {
            exponent,
            peer_partial_key: proof.partial_key,
        };
        Ok(())
    }

    /// Derive the session key once `Response2` has been verified.
    pub fn finish(&mut self) -> Result<&SessionKey> {
        match mem::replace(&mut self.state, ResponderState::Failed) {
            ResponderState::Verified {
                exponent,
                peer_partial_key,
            } => {
                let session_key = self.params.shared_key(&peer_partial_key, &exponent);
                debug!("responder derived session key");
                self.state = ResponderState::Established { session_key };
            }
            other => {
                let from = other.label();
                self.state = other;
                return Err(SealTrustError::InvalidStateTransition {
                    from: from.into(),
                    to: "Established".into(),
                });
            }
        }
        self.session_key()
            .ok_or_else(|| SealTrustError::InvalidStateTransition {
                from: "Failed".into(),
                to: "Established".into(),
            })
    }

    pub fn session_key(&self) -> Option<&SessionKey> {
        match &self.state {
            ResponderState::Established { session_key } => Some(session_key),
            _ => None,
        }
    }

    pub fn into_session_key(mut self) -> Option<SessionKey> {
        match mem::replace(&mut self.state, ResponderState::Failed) {
            ResponderState::Established { session_key } => Some(session_key),
            _ => None,
        }
    }

    pub fn is_established(&self) -> bool {
        matches!(self.state, ResponderState::Established { .. })
    }
}
