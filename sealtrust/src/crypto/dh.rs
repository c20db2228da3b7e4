// Finite-field Diffie-Hellman over a fixed 512-bit modulus.
//
// g and p are 64-byte big-endian constants compiled into both peers.
// Exponents are 64 random bytes read as a big-endian integer; the agreed
// value peer^own mod p is carried as its base-10 digit string, which is
// what the application cipher derives its key from.

use std::fmt;

use num_bigint::BigUint;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::hash::short_hex;
use crate::error::{Result, SealTrustError};

/// Width in bytes of g, p, exponents and partial keys.
pub const DH_LEN: usize = 64;

/// Generator g = 2.
pub const GENERATOR: [u8; DH_LEN] = generator_bytes();

/// Modulus p = 2^512 - 569.
pub const MODULUS: [u8; DH_LEN] = modulus_bytes();

const fn generator_bytes() -> [u8; DH_LEN] {
    let mut g = [0u8; DH_LEN];
    g[DH_LEN - 1] = 2;
    g
}

const fn modulus_bytes() -> [u8; DH_LEN] {
    let mut p = [0xFFu8; DH_LEN];
    p[DH_LEN - 2] = 0xFD;
    p[DH_LEN - 1] = 0xC7;
    p
}

/// Public group parameters shared by both peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhParameters {
    g: BigUint,
    p: BigUint,
}

impl Default for DhParameters {
    fn default() -> Self {
        Self::from_bytes(&GENERATOR, &MODULUS)
    }
}

impl DhParameters {
    /// Build parameters from big-endian generator and modulus bytes.
    pub fn from_bytes(generator: &[u8], modulus: &[u8]) -> Self {
        Self {
            g: BigUint::from_bytes_be(generator),
            p: BigUint::from_bytes_be(modulus),
        }
    }

    /// g^exponent mod p.
    pub fn partial_key(&self, exponent: &Exponent) -> PartialKey {
        let value = self.g.modpow(&exponent.to_biguint(), &self.p);
        PartialKey::from_biguint(&value)
    }

    /// peer^exponent mod p, rendered as a decimal session key.
    pub fn shared_key(&self, peer: &PartialKey, exponent: &Exponent) -> SessionKey {
        let value = peer.to_biguint().modpow(&exponent.to_biguint(), &self.p);
        SessionKey(value.to_str_radix(10))
    }
}

/// A private exponent for one handshake. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Exponent([u8; DH_LEN]);

impl Exponent {
    /// 64 bytes from the OS CSPRNG.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; DH_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| SealTrustError::Random(format!("exponent: {e}")))?;
        Ok(Self(bytes))
    }

    /// Create from existing bytes (used in deterministic tests).
    pub fn from_bytes(bytes: [u8; DH_LEN]) -> Self {
        Self(bytes)
    }

    fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }
}

impl fmt::Debug for Exponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Exponent(..)")
    }
}

/// A peer's public value g^x mod p, 64 bytes big-endian.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PartialKey([u8; DH_LEN]);

impl PartialKey {
    pub fn from_bytes(bytes: [u8; DH_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from a slice that must be exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; DH_LEN] = bytes.try_into().map_err(|_| SealTrustError::Malformed {
            context: "partial key",
            expected: DH_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; DH_LEN] {
        &self.0
    }

    fn from_biguint(value: &BigUint) -> Self {
        // value < p < 2^512, so it always fits; left-pad with zeros.
        let raw = value.to_bytes_be();
        let mut out = [0u8; DH_LEN];
        out[DH_LEN - raw.len()..].copy_from_slice(&raw);
        Self(out)
    }

    fn to_biguint(self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }
}

impl fmt::Debug for PartialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartialKey({})", short_hex(&self.0))
    }
}

/// The agreed session key as base-10 ASCII digits ("0" for zero, no
/// leading zeros). Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey(String);

impl SessionKey {
    /// Decimal digits, the passphrase input for the application cipher.
    pub fn as_decimal(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey({} digits)", self.0.len())
    }
}

/// Fresh random exponent.
pub fn generate_exponent() -> Result<Exponent> {
    Exponent::generate()
}

/// g^exponent mod p with the standard parameters.
pub fn generate_partial_key(exponent: &Exponent) -> PartialKey {
    DhParameters::default().partial_key(exponent)
}

/// peer^own mod p with the standard parameters.
pub fn compute_shared_key(peer: &PartialKey, own: &Exponent) -> SessionKey {
    DhParameters::default().shared_key(peer, own)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_exponent(v: u8) -> Exponent {
        let mut bytes = [0u8; DH_LEN];
        bytes[DH_LEN - 1] = v;
        Exponent::from_bytes(bytes)
    }

    #[test]
    fn test_dh_shared_secret_matches() {
        let a = generate_exponent().unwrap();
        let b = generate_exponent().unwrap();
        let ab = compute_shared_key(&generate_partial_key(&a), &b);
        let ba = compute_shared_key(&generate_partial_key(&b), &a);
        assert_eq!(ab, ba);
    }

    #[test]
    fn exponent_one_yields_generator() {
        let pk = generate_partial_key(&small_exponent(1));
        assert_eq!(pk.as_bytes(), &GENERATOR);
    }

    #[test]
    fn decimal_rendering() {
        // 2^10 = 1024, far below p.
        let key = compute_shared_key(&PartialKey::from_bytes(GENERATOR), &small_exponent(10));
        assert_eq!(key.as_decimal(), "1024");

        let zero = compute_shared_key(&PartialKey::from_bytes([0u8; DH_LEN]), &small_exponent(3));
        assert_eq!(zero.as_decimal(), "0");
    }

    #[test]
    fn partial_key_is_reduced_mod_p() {
        let pk = generate_partial_key(&generate_exponent().unwrap());
        let p = BigUint::from_bytes_be(&MODULUS);
        assert!(BigUint::from_bytes_be(pk.as_bytes()) < p);
    }

    #[test]
    fn partial_key_from_slice_checks_width() {
        assert!(PartialKey::from_slice(&[0u8; 63]).is_err());
        assert!(PartialKey::from_slice(&[0u8; 64]).is_ok());
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let e = small_exponent(9);
        assert_eq!(format!("{e:?}"), "Exponent(..)");
        let key = compute_shared_key(&PartialKey::from_bytes(GENERATOR), &small_exponent(10));
        assert_eq!(format!("{key:?}"), "SessionKey(4 digits)");
    }

    #[test]
    fn modulus_constant() {
        let p = BigUint::from_bytes_be(&MODULUS);
        let expected = (BigUint::from(1u8) << 512usize) - BigUint::from(569u32);
        assert_eq!(p, expected);
    }
}
