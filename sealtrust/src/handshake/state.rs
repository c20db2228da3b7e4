// Handshake state machine.

use crate::crypto::dh::{Exponent, PartialKey, SessionKey};
use crate::handshake::messages::Challenge;

/// Where an `Initiator` stands in the exchange.
#[derive(Debug)]
pub enum InitiatorState {
    /// Nothing sent yet.
    Idle,

    /// `Begin` sent, waiting for `Response1`.
    BeginSent {
        /// R_A, which the responder must echo back.
        challenge: Challenge,
    },

    /// `Response1` verified and `Response2` produced; key not derived yet.
    Verified {
        /// Our private exponent a.
        exponent: Exponent,
        /// The responder's g^b mod p.
        peer_partial_key: PartialKey,
    },

    /// Handshake complete.
    Established {
        session_key: SessionKey,
    },

    /// A step failed; the handshake cannot continue.
    Failed,
}

impl InitiatorState {
    /// Human-readable label for the current state (used in error messages).
    pub fn label(&self) -> &'static str {
        match self {
            InitiatorState::Idle => "Idle",
            InitiatorState::BeginSent { .. } => "BeginSent",
            InitiatorState::Verified { .. } => "Verified",
            InitiatorState::Established { .. } => "Established",
            InitiatorState::Failed => "Failed",
        }
    }
}

/// Where a `Responder` stands in the exchange.
#[derive(Debug)]
pub enum ResponderState {
    /// Waiting for `Begin`.
    Idle,

    /// `Response1` sent, waiting for `Response2`.
    Response1Sent {
        /// R_B, which the initiator must echo back.
        challenge: Challenge,
        /// Our private exponent b.
        exponent: Exponent,
    },

    /// `Response2` verified; key not derived yet.
    Verified {
        /// Our private exponent b.
        exponent: Exponent,
        /// The initiator's g^a mod p.
        peer_partial_key: PartialKey,
    },

    /// Handshake complete.
    Established {
        session_key: SessionKey,
    },

    /// A step failed; the handshake cannot continue.
    Failed,
}

impl ResponderState {
    pub fn label(&self) -> &'static str {
        match self {
            ResponderState::Idle => "Idle",
            ResponderState::Response1Sent { .. } => "Response1Sent",
            ResponderState::Verified { .. } => "Verified",
            ResponderState::Established { .. } => "Established",
            ResponderState::Failed => "Failed",
        }
    }
}
