// Integration tests for the SealTrust 3-message handshake.

use sealtrust::crypto::cipher::PassphraseCipher;
use sealtrust::handshake::messages::{
    Challenge, HandshakeMessage, MessageKind, Response1, Response2, CHALLENGE_LEN,
    RESPONSE1_BLOB_LEN, RESPONSE2_BLOB_LEN,
};
use sealtrust::{Initiator, Responder, SealTrustError};

// ── Full 3-message handshake ─────────────────────────────────────────────

#[test]
fn full_handshake_succeeds() {
    let mut initiator = Initiator::new("s3cr3t");
    let mut responder = Responder::new("s3cr3t");

    let begin = initiator.create_begin().unwrap();
    let response1 = responder.process_begin(&begin).unwrap();
    assert_eq!(response1.blob.len(), RESPONSE1_BLOB_LEN);

    let response2 = initiator.process_response1(&response1).unwrap();
    assert_eq!(response2.blob.len(), RESPONSE2_BLOB_LEN);
    let client_key = initiator.finish().unwrap().clone();

    let server_key = responder.process_response2(&response2).unwrap().clone();
    assert_eq!(client_key, server_key);
}

#[test]
fn handshake_over_encoded_bytes() {
    let mut initiator = Initiator::new("pw");
    let mut responder = Responder::new("pw");

    let wire = HandshakeMessage::from(initiator.create_begin().unwrap()).encode();
    let begin = match HandshakeMessage::decode(MessageKind::Begin, &wire).unwrap() {
        HandshakeMessage::Begin(b) => b,
        other => panic!("unexpected {:?}", other.kind()),
    };
    let wire = HandshakeMessage::from(responder.process_begin(&begin).unwrap()).encode();
    let response1 = match HandshakeMessage::decode(MessageKind::Response1, &wire).unwrap() {
        HandshakeMessage::Response1(r) => r,
        other => panic!("unexpected {:?}", other.kind()),
    };
    let wire = HandshakeMessage::from(initiator.process_response1(&response1).unwrap()).encode();
    let response2 = match HandshakeMessage::decode(MessageKind::Response2, &wire).unwrap() {
        HandshakeMessage::Response2(r) => r,
        other => panic!("unexpected {:?}", other.kind()),
    };

    let server_key = responder.process_response2(&response2).unwrap().clone();
    assert_eq!(initiator.finish().unwrap(), &server_key);
}

#[test]
fn sessions_get_distinct_keys() {
    let run = || {
        let mut i = Initiator::new("pw");
        let mut r = Responder::new("pw");
        let r1 = r.process_begin(&i.create_begin().unwrap()).unwrap();
        i.process_response1(&r1).unwrap();
        i.into_session_key()
    };
    // into_session_key before finish yields nothing
    assert!(run().is_none());

    let mut i1 = Initiator::new("pw");
    let mut r1 = Responder::new("pw");
    let m = r1.process_begin(&i1.create_begin().unwrap()).unwrap();
    i1.process_response1(&m).unwrap();
    let k1 = i1.finish().unwrap().clone();

    let mut i2 = Initiator::new("pw");
    let mut r2 = Responder::new("pw");
    let m = r2.process_begin(&i2.create_begin().unwrap()).unwrap();
    i2.process_response1(&m).unwrap();
    let k2 = i2.finish().unwrap().clone();

    assert_ne!(k1, k2);
}

// ── Authentication failures ──────────────────────────────────────────────

#[test]
fn wrong_secret_detected_by_initiator() {
    let mut initiator = Initiator::new("correct horse");
    let mut responder = Responder::new("battery staple");

    let begin = initiator.create_begin().unwrap();
    let response1 = responder.process_begin(&begin).unwrap();
    let err = initiator.process_response1(&response1).unwrap_err();

    assert!(matches!(err, SealTrustError::Authentication(_)));
    assert!(initiator.session_key().is_none());
    // No further step is possible.
    assert!(initiator.finish().is_err());
}

#[test]
fn corrupted_response1_blob_rejected() {
    let mut initiator = Initiator::new("s3cr3t");
    let mut responder = Responder::new("s3cr3t");

    let begin = initiator
        .create_begin_with_challenge(Challenge::from_bytes([0x41; CHALLENGE_LEN]))
        .unwrap();
    let mut response1 = responder.process_begin(&begin).unwrap();
    // Inside the echoed challenge region of the ciphertext.
    response1.blob[100] ^= 0xFF;

    let err = initiator.process_response1(&response1).unwrap_err();
    assert!(matches!(err, SealTrustError::Authentication(_)));
    assert!(initiator.session_key().is_none());
}

#[test]
fn response1_without_server_tag_rejected() {
    let challenge = Challenge::from_bytes([0x41; CHALLENGE_LEN]);
    let mut initiator = Initiator::new("pw");
    initiator.create_begin_with_challenge(challenge.clone()).unwrap();

    // Correctly echoed challenge, wrong tag.
    let mut plaintext = b"CLNT".to_vec();
    plaintext.extend_from_slice(challenge.as_bytes());
    plaintext.extend_from_slice(&[3u8; 64]);
    let forged = Response1 {
        challenge: Challenge::from_bytes([0u8; CHALLENGE_LEN]),
        blob: PassphraseCipher::new("pw").encrypt(&plaintext).unwrap(),
    };
    assert!(matches!(
        initiator.process_response1(&forged).unwrap_err(),
        SealTrustError::Authentication(_)
    ));
}

#[test]
fn response2_with_wrong_challenge_rejected() {
    let mut responder = Responder::new("pw");
    let mut initiator = Initiator::new("pw");
    responder.process_begin(&initiator.create_begin().unwrap()).unwrap();

    // Echo a challenge the responder never sent.
    let mut plaintext = vec![0x5A; CHALLENGE_LEN];
    plaintext.extend_from_slice(&[2u8; 64]);
    let forged = Response2 {
        blob: PassphraseCipher::new("pw").encrypt(&plaintext).unwrap(),
    };
    assert!(matches!(
        responder.process_response2(&forged).unwrap_err(),
        SealTrustError::Authentication(_)
    ));
    assert!(responder.session_key().is_none());
}

#[test]
fn response2_from_wrong_secret_rejected() {
    let mut initiator = Initiator::new("pw");
    let mut responder = Responder::new("pw");
    let response1 = responder.process_begin(&initiator.create_begin().unwrap()).unwrap();
    initiator.process_response1(&response1).unwrap();

    let mut plaintext = response1.challenge.as_bytes().to_vec();
    plaintext.extend_from_slice(&[2u8; 64]);
    let forged = Response2 {
        blob: PassphraseCipher::new("not pw").encrypt(&plaintext).unwrap(),
    };
    assert!(responder.process_response2(&forged).is_err());
}

#[test]
fn truncated_blob_is_a_cipher_error() {
    let mut initiator = Initiator::new("pw");
    let mut responder = Responder::new("pw");
    let mut response1 = responder.process_begin(&initiator.create_begin().unwrap()).unwrap();
    response1.blob.truncate(RESPONSE1_BLOB_LEN - 3);
    assert!(initiator.process_response1(&response1).unwrap_err().is_cipher());
}

// ── State enforcement ────────────────────────────────────────────────────

#[test]
fn responder_rejects_second_begin() {
    let mut initiator = Initiator::new("pw");
    let mut responder = Responder::new("pw");
    let begin = initiator.create_begin().unwrap();
    responder.process_begin(&begin).unwrap();
    assert!(matches!(
        responder.process_begin(&begin).unwrap_err(),
        SealTrustError::InvalidStateTransition { .. }
    ));
}

#[test]
fn initiator_rejects_response1_before_begin() {
    let mut initiator = Initiator::new("pw");
    let response1 = Response1 {
        challenge: Challenge::from_bytes([0u8; CHALLENGE_LEN]),
        blob: vec![0u8; RESPONSE1_BLOB_LEN],
    };
    assert!(matches!(
        initiator.process_response1(&response1).unwrap_err(),
        SealTrustError::InvalidStateTransition { .. }
    ));
}
