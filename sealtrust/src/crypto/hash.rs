// SHA-256 hashing and short hex rendering for diagnostics.

use sha2::{Digest, Sha256};

/// Longest hex string `short_hex` returns before truncating.
const HEX_PREVIEW_LEN: usize = 40;

/// SHA-256 hash of `data`, returning a 32-byte digest.
pub fn hash_sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

/// Space-separated hex of `bytes`, cut at 40 characters with a trailing `...`.
///
/// Used only in trace logs for public values (challenges, partial keys).
pub fn short_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(HEX_PREVIEW_LEN + 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{b:02x}"));
        if out.len() > HEX_PREVIEW_LEN {
            out.truncate(HEX_PREVIEW_LEN);
            out.push_str("...");
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("") = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
        let hash = hash_sha256(b"");
        assert_eq!(
            hex(&hash),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_abc_vector() {
        let hash = hash_sha256(b"abc");
        assert_eq!(
            hex(&hash),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn short_hex_small_input_untouched() {
        assert_eq!(short_hex(&[0x01, 0xab, 0xff]), "01 ab ff");
        assert_eq!(short_hex(&[]), "");
    }

    #[test]
    fn short_hex_truncates_long_input() {
        let s = short_hex(&[0x41; 512]);
        assert!(s.ends_with("..."));
        assert_eq!(s.len(), HEX_PREVIEW_LEN + 3);
        assert!(s.starts_with("41 41 41"));
    }

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}
