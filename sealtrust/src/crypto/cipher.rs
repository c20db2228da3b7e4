// AES-256-CBC with zero-fill padding, keyed by SHA-256 of a passphrase.
//
// Every ciphertext has the form IV(16) || CBC blocks. The plaintext is
// right-padded with zero bytes up to the next 16-byte boundary and the
// padding is NOT stripped on decrypt: callers must know the true length
// out of band (fixed-width handshake fields, or the outer application
// frame). Trailing zero bytes in application data are indistinguishable
// from padding. There is no MAC; corruption is only detected by whatever
// the caller checks inside the plaintext.

use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::hash::hash_sha256;
use crate::error::{Result, SealTrustError};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Length of the random IV prefixed to every ciphertext.
pub const IV_LEN: usize = 16;

/// AES-256 key length.
pub const KEY_LEN: usize = 32;

/// Derive a 32-byte AES key from a passphrase: SHA-256 of its UTF-8 bytes.
///
/// The same derivation keys handshake messages (passphrase = shared secret)
/// and application messages (passphrase = decimal session key).
pub fn derive_key(passphrase: &str) -> [u8; KEY_LEN] {
    hash_sha256(passphrase.as_bytes())
}

/// Length of `len` bytes after zero padding to the block size.
pub const fn padded_len(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// Length of the ciphertext `encrypt` produces for a `len`-byte plaintext.
pub const fn ciphertext_len(len: usize) -> usize {
    IV_LEN + padded_len(len)
}

/// Encrypt `plaintext` under `key` with a fresh random IV.
///
/// Returns IV || AES-256-CBC(zero-padded plaintext).
pub fn encrypt(plaintext: &[u8], key: &[u8; KEY_LEN]) -> Result<Vec<u8>> {
    let mut iv = [0u8; IV_LEN];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| SealTrustError::Random(format!("iv: {e}")))?;
    encrypt_with_iv(plaintext, key, &iv)
}

/// Encrypt with a caller-chosen IV. Only for known-answer tests and
/// benchmarks; `encrypt` is the normal entry point.
pub fn encrypt_with_iv(
    plaintext: &[u8],
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
) -> Result<Vec<u8>> {
    let body_len = padded_len(plaintext.len());
    let mut out = vec![0u8; IV_LEN + body_len];
    out[..IV_LEN].copy_from_slice(iv);
    out[IV_LEN..IV_LEN + plaintext.len()].copy_from_slice(plaintext);
    if body_len == 0 {
        return Ok(out);
    }

    let cipher = Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|_| SealTrustError::CipherInit("aes-256-cbc key/iv length".into()))?;
    cipher
        .encrypt_padded_mut::<NoPadding>(&mut out[IV_LEN..], body_len)
        .map_err(|_| SealTrustError::CipherInit("buffer not block aligned".into()))?;
    Ok(out)
}

/// Decrypt IV || CBC blocks under `key`.
///
/// The returned plaintext still carries any zero padding.
pub fn decrypt(ciphertext: &[u8], key: &[u8; KEY_LEN]) -> Result<Vec<u8>> {
    if ciphertext.len() < IV_LEN {
        return Err(SealTrustError::CiphertextTooShort {
            min: IV_LEN,
            actual: ciphertext.len(),
        });
    }
    let (iv, body) = ciphertext.split_at(IV_LEN);
    if body.len() % BLOCK_SIZE != 0 {
        return Err(SealTrustError::CiphertextMisaligned(body.len()));
    }

    let mut buf = body.to_vec();
    if buf.is_empty() {
        return Ok(buf);
    }
    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| SealTrustError::CipherInit("aes-256-cbc key/iv length".into()))?;
    cipher
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| SealTrustError::CiphertextMisaligned(body.len()))?;
    Ok(buf)
}

/// A cipher keyed once from a passphrase. The key is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PassphraseCipher {
    key: [u8; KEY_LEN],
}

impl PassphraseCipher {
    /// Derive the key from `passphrase` (see [`derive_key`]).
    pub fn new(passphrase: &str) -> Self {
        Self {
            key: derive_key(passphrase),
        }
    }

    /// Encrypt with a fresh IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        encrypt(plaintext, &self.key)
    }

    /// Decrypt; padding is left in place.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        decrypt(ciphertext, &self.key)
    }

    /// Return the key bytes.
    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl std::fmt::Debug for PassphraseCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PassphraseCipher(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_known_lengths() {
        let key = derive_key("s3cr3t");
        for len in [0usize, 1, 15, 16, 17, 1000] {
            let plaintext: Vec<u8> = (0..len).map(|i| (i % 251) as u8 + 1).collect();
            let ct = encrypt(&plaintext, &key).unwrap();
            assert_eq!(ct.len(), ciphertext_len(len), "len {len}");
            let pt = decrypt(&ct, &key).unwrap();
            assert_eq!(pt.len(), padded_len(len));
            assert_eq!(&pt[..len], &plaintext[..], "len {len}");
            assert!(pt[len..].iter().all(|&b| b == 0), "padding must be zero");
        }
    }

    #[test]
    fn padding_lengths() {
        assert_eq!(padded_len(0), 0);
        assert_eq!(padded_len(1), 16);
        assert_eq!(padded_len(16), 16);
        assert_eq!(padded_len(17), 32);
        assert_eq!(padded_len(580), 592);
        assert_eq!(padded_len(576), 576);
        assert_eq!(ciphertext_len(580), 608);
        assert_eq!(ciphertext_len(576), 592);
    }

    #[test]
    fn short_ciphertext_rejected() {
        let key = [0x11u8; 32];
        match decrypt(&[0u8; 8], &key) {
            Err(SealTrustError::CiphertextTooShort { min, actual }) => {
                assert_eq!(min, 16);
                assert_eq!(actual, 8);
            }
            other => panic!("expected CiphertextTooShort, got {other:?}"),
        }
    }

    #[test]
    fn misaligned_ciphertext_rejected() {
        let key = [0x11u8; 32];
        let err = decrypt(&[0u8; 20], &key).unwrap_err();
        assert!(matches!(err, SealTrustError::CiphertextMisaligned(4)));
        assert!(err.is_cipher());
    }

    #[test]
    fn fixed_iv_is_deterministic() {
        let key = derive_key("k");
        let iv = [7u8; 16];
        let a = encrypt_with_iv(b"hello", &key, &iv).unwrap();
        let b = encrypt_with_iv(b"hello", &key, &iv).unwrap();
        assert_eq!(a, b);
        assert_eq!(&a[..16], &iv);
    }

    #[test]
    fn fresh_iv_per_encryption() {
        let key = derive_key("k");
        let a = encrypt(b"same", &key).unwrap();
        let b = encrypt(b"same", &key).unwrap();
        assert_ne!(a[..16], b[..16]);
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_yields_garbage_not_error() {
        // No MAC: decryption under the wrong key "succeeds" with junk bytes.
        let ct = encrypt(b"attack at dawn!!", &derive_key("right")).unwrap();
        let pt = decrypt(&ct, &derive_key("wrong")).unwrap();
        assert_eq!(pt.len(), 16);
        assert_ne!(&pt[..], b"attack at dawn!!");
    }

    #[test]
    fn trailing_zero_bytes_merge_with_padding() {
        let key = derive_key("k");
        let ct_a = encrypt(b"abc", &key).unwrap();
        let ct_b = encrypt(b"abc\0\0", &key).unwrap();
        assert_eq!(decrypt(&ct_a, &key).unwrap(), decrypt(&ct_b, &key).unwrap());
    }

    #[test]
    fn passphrase_cipher_roundtrip() {
        let c = PassphraseCipher::new("passphrase");
        assert_eq!(c.key(), &derive_key("passphrase"));
        let ct = c.encrypt(b"0123456789abcdef").unwrap();
        assert_eq!(c.decrypt(&ct).unwrap(), b"0123456789abcdef");
        assert_eq!(format!("{c:?}"), "PassphraseCipher(..)");
    }
}
