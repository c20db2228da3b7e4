// Handshake messages exchanged during the SealTrust 3-message protocol.
//
// Every field is fixed width, so each message has one exact wire size and
// needs no tag or length prefix; the reader knows which message the current
// step expects.
//
//   Begin      challenge(512)                                   512 bytes
//   Response1  challenge(512) || IV(16) || CBC(SRVR||R_A||g^b)  1120 bytes
//   Response2  IV(16) || CBC(R_B||g^a)                          592 bytes

use bytes::{BufMut, Bytes, BytesMut};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::crypto::cipher::{ciphertext_len, padded_len};
use crate::crypto::dh::{PartialKey, DH_LEN};
use crate::crypto::hash::short_hex;
use crate::error::{Result, SealTrustError};

/// Challenge nonce length.
pub const CHALLENGE_LEN: usize = 512;

/// Literal marking the responder's encrypted payload.
pub const SERVER_TAG: [u8; 4] = *b"SRVR";

/// Plaintext inside Response1: tag || echoed challenge || partial key.
pub const SERVER_PROOF_LEN: usize = SERVER_TAG.len() + CHALLENGE_LEN + DH_LEN;

/// Plaintext inside Response2: echoed challenge || partial key.
pub const CLIENT_PROOF_LEN: usize = CHALLENGE_LEN + DH_LEN;

/// Encrypted blob carried by Response1 (16 + 592).
pub const RESPONSE1_BLOB_LEN: usize = ciphertext_len(SERVER_PROOF_LEN);

/// Encrypted blob carried by Response2 (16 + 576).
pub const RESPONSE2_BLOB_LEN: usize = ciphertext_len(CLIENT_PROOF_LEN);

pub const BEGIN_LEN: usize = CHALLENGE_LEN;
pub const RESPONSE1_LEN: usize = CHALLENGE_LEN + RESPONSE1_BLOB_LEN;
pub const RESPONSE2_LEN: usize = RESPONSE2_BLOB_LEN;

/// A 512-byte freshness nonce, generated once per handshake attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct Challenge([u8; CHALLENGE_LEN]);

impl Challenge {
    /// 512 bytes from the OS CSPRNG.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; CHALLENGE_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| SealTrustError::Random(format!("challenge: {e}")))?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; CHALLENGE_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from a slice that must be exactly 512 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; CHALLENGE_LEN] =
            bytes.try_into().map_err(|_| SealTrustError::Malformed {
                context: "challenge",
                expected: CHALLENGE_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; CHALLENGE_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Challenge({})", short_hex(&self.0))
    }
}

/// Message 1: Initiator -> Responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Begin {
    /// The initiator's fresh challenge R_A.
    pub challenge: Challenge,
}

/// Message 2: Responder -> Initiator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response1 {
    /// The responder's fresh challenge R_B (sent in the clear).
    pub challenge: Challenge,
    /// Encrypt(SRVR || R_A || g^b mod p) under the shared-secret key.
    pub blob: Vec<u8>,
}

/// Message 3: Initiator -> Responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response2 {
    /// Encrypt(R_B || g^a mod p) under the shared-secret key.
    pub blob: Vec<u8>,
}

/// Discriminator for the closed set of handshake messages. The protocol
/// step decides which one is expected; the wire carries no tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Begin,
    Response1,
    Response2,
}

impl MessageKind {
    /// Exact encoded size of this message.
    pub fn wire_len(self) -> usize {
        match self {
            MessageKind::Begin => BEGIN_LEN,
            MessageKind::Response1 => RESPONSE1_LEN,
            MessageKind::Response2 => RESPONSE2_LEN,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MessageKind::Begin => "Begin",
            MessageKind::Response1 => "Response1",
            MessageKind::Response2 => "Response2",
        }
    }
}

/// A handshake message of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    Begin(Begin),
    Response1(Response1),
    Response2(Response2),
}

impl HandshakeMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            HandshakeMessage::Begin(_) => MessageKind::Begin,
            HandshakeMessage::Response1(_) => MessageKind::Response1,
            HandshakeMessage::Response2(_) => MessageKind::Response2,
        }
    }

    /// Encode this message into its fixed-width wire form.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.kind().wire_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encode into a pre-allocated `BytesMut`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            HandshakeMessage::Begin(m) => {
                buf.put_slice(m.challenge.as_bytes());
            }
            HandshakeMessage::Response1(m) => {
                buf.put_slice(m.challenge.as_bytes());
                buf.put_slice(&m.blob);
            }
            HandshakeMessage::Response2(m) => {
                buf.put_slice(&m.blob);
            }
        }
    }

    /// Decode a message of the `expected` kind from exactly its wire bytes.
    pub fn decode(expected: MessageKind, data: &[u8]) -> Result<Self> {
        Self::ensure_len(data, expected)?;
        match expected {
            MessageKind::Begin => Ok(HandshakeMessage::Begin(Begin {
                challenge: Challenge::from_slice(data)?,
            })),
            MessageKind::Response1 => {
                let (challenge, blob) = data.split_at(CHALLENGE_LEN);
                Ok(HandshakeMessage::Response1(Response1 {
                    challenge: Challenge::from_slice(challenge)?,
                    blob: blob.to_vec(),
                }))
            }
            MessageKind::Response2 => Ok(HandshakeMessage::Response2(Response2 {
                blob: data.to_vec(),
            })),
        }
    }

    fn ensure_len(data: &[u8], kind: MessageKind) -> Result<()> {
        if data.len() != kind.wire_len() {
            Err(SealTrustError::Malformed {
                context: kind.label(),
                expected: kind.wire_len(),
                actual: data.len(),
            })
        } else {
            Ok(())
        }
    }
}

impl From<Begin> for HandshakeMessage {
    fn from(m: Begin) -> Self {
        HandshakeMessage::Begin(m)
    }
}

impl From<Response1> for HandshakeMessage {
    fn from(m: Response1) -> Self {
        HandshakeMessage::Response1(m)
    }
}

impl From<Response2> for HandshakeMessage {
    fn from(m: Response2) -> Self {
        HandshakeMessage::Response2(m)
    }
}

/// Decrypted contents of a Response1 blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProof {
    pub tag: [u8; 4],
    pub echoed_challenge: Challenge,
    pub partial_key: PartialKey,
}

impl ServerProof {
    pub fn new(echoed_challenge: Challenge, partial_key: PartialKey) -> Self {
        Self {
            tag: SERVER_TAG,
            echoed_challenge,
            partial_key,
        }
    }

    /// tag(4) || challenge(512) || partial key(64); 580 bytes before padding.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(padded_len(SERVER_PROOF_LEN));
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(self.echoed_challenge.as_bytes());
        out.extend_from_slice(self.partial_key.as_bytes());
        out
    }

    /// Parse the fixed fields from a decrypted (still padded) plaintext.
    /// Bytes past the 580-byte boundary are padding and are ignored.
    pub fn decode(plaintext: &[u8]) -> Result<Self> {
        if plaintext.len() < SERVER_PROOF_LEN {
            return Err(SealTrustError::Malformed {
                context: "server proof",
                expected: SERVER_PROOF_LEN,
                actual: plaintext.len(),
            });
        }
        let (tag, rest) = plaintext.split_at(SERVER_TAG.len());
        let (challenge, rest) = rest.split_at(CHALLENGE_LEN);
        let mut tag_bytes = [0u8; 4];
        tag_bytes.copy_from_slice(tag);
        Ok(Self {
            tag: tag_bytes,
            echoed_challenge: Challenge::from_slice(challenge)?,
            partial_key: PartialKey::from_slice(&rest[..DH_LEN])?,
        })
    }
}

/// Decrypted contents of a Response2 blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProof {
    pub echoed_challenge: Challenge,
    pub partial_key: PartialKey,
}

impl ClientProof {
    /// challenge(512) || partial key(64); 576 bytes, already block aligned.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CLIENT_PROOF_LEN);
        out.extend_from_slice(self.echoed_challenge.as_bytes());
        out.extend_from_slice(self.partial_key.as_bytes());
        out
    }

    pub fn decode(plaintext: &[u8]) -> Result<Self> {
        if plaintext.len() < CLIENT_PROOF_LEN {
            return Err(SealTrustError::Malformed {
                context: "client proof",
                expected: CLIENT_PROOF_LEN,
                actual: plaintext.len(),
            });
        }
        let (challenge, rest) = plaintext.split_at(CHALLENGE_LEN);
        Ok(Self {
            echoed_challenge: Challenge::from_slice(challenge)?,
            partial_key: PartialKey::from_slice(&rest[..DH_LEN])?,
        })
    }
}
