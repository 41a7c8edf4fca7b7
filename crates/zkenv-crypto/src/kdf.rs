//! Key derivation: token pair (and optional PIN) → 256-bit AES key

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};
use zkenv_core::ZkenvResult;

use crate::pin::Pin;
use crate::KEY_SIZE;

/// HKDF info for the pair-only protocol
pub const PAIR_INFO: &[u8] = b"zkdotenv";

/// HKDF info for the PIN protocol
pub const PIN_INFO: &[u8] = b"zkdotenv-pin";

/// Public domain-separation salt for the PIN protocol
pub const PIN_SALT: &[u8] = b"zkshare-pin-salt";

/// A 256-bit key derived for one encrypt or decrypt operation.
///
/// Zeroized on drop; deliberately not `Clone`.
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Inputs to a derivation, one variant per protocol.
#[derive(Clone, Copy)]
pub enum KeyMaterial<'a> {
    Pair { token_a: &'a str, token_b: &'a str },
    Pin { token_a: &'a str, pin: &'a Pin },
}

pub fn derive_key(material: KeyMaterial<'_>) -> ZkenvResult<DerivedKey> {
    match material {
        KeyMaterial::Pair { token_a, token_b } => derive_pair_key(token_a, token_b),
        KeyMaterial::Pin { token_a, pin } => derive_pin_key(token_a, pin),
    }
}

/// `HKDF-SHA256(salt = tokenA, info = "zkdotenv", ikm = tokenB)`
pub fn derive_pair_key(token_a: &str, token_b: &str) -> ZkenvResult<DerivedKey> {
    hkdf_derive(Some(token_a.as_bytes()), token_b.as_bytes(), PAIR_INFO)
}

/// `HKDF-SHA256(salt = "zkshare-pin-salt", info = "zkdotenv-pin", ikm = tokenA ‖ PIN)`
pub fn derive_pin_key(token_a: &str, pin: &Pin) -> ZkenvResult<DerivedKey> {
    let mut ikm = Zeroizing::new(Vec::with_capacity(token_a.len() + pin.expose().len()));
    ikm.extend_from_slice(token_a.as_bytes());
    ikm.extend_from_slice(pin.expose().as_bytes());
    hkdf_derive(Some(PIN_SALT), &ikm, PIN_INFO)
}

fn hkdf_derive(salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> ZkenvResult<DerivedKey> {
    let hkdf = Hkdf::<Sha256>::new(salt, ikm);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(info, &mut okm)
        .map_err(|e| anyhow::anyhow!("HKDF expand failed: {e}"))?;
    Ok(DerivedKey::from_bytes(okm))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN_A: &str = "Q2hhbmdlIG1lIHRvIGEgcmVhbCB0b2tlbiBwbGVhc2U";
    const TOKEN_B: &str = "dG9rZW4tYi1mb3ItdGVzdGluZy1wdXJwb3Nlcy1vbmx5";

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    // Vectors produced with the Python `cryptography` HKDF used by existing clients.
    #[test]
    fn test_pair_key_known_answer() {
        let key = derive_pair_key(TOKEN_A, TOKEN_B).unwrap();
        assert_eq!(
            hex(key.as_bytes()),
            "1d0d47d978c1cad9418f2584c9a295a30683eead9de97ef288b92e7cc7038f72"
        );
    }

    #[test]
    fn test_pin_key_known_answer() {
        let pin = Pin::parse("123456").unwrap();
        let key = derive_pin_key(TOKEN_A, &pin).unwrap();
        assert_eq!(
            hex(key.as_bytes()),
            "b84e5fb8f7dee431516d89131af8334727ac52ecedf361e4e89a6a4fea6a22bf"
        );
    }

    #[test]
    fn test_kdf_deterministic() {
        let pin = Pin::parse("123456").unwrap();
        let k1 = derive_key(KeyMaterial::Pin { token_a: TOKEN_A, pin: &pin }).unwrap();
        let k2 = derive_key(KeyMaterial::Pin { token_a: TOKEN_A, pin: &pin }).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn test_different_pins_different_keys() {
        let k1 = derive_pin_key(TOKEN_A, &Pin::parse("123456").unwrap()).unwrap();
        let k2 = derive_pin_key(TOKEN_A, &Pin::parse("123457").unwrap()).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_pair_roles_are_not_symmetric() {
        let ab = derive_pair_key(TOKEN_A, TOKEN_B).unwrap();
        let ba = derive_pair_key(TOKEN_B, TOKEN_A).unwrap();
        assert_ne!(
            ab.as_bytes(),
            ba.as_bytes(),
            "salt and ikm roles must be fixed by both sides"
        );
    }

    #[test]
    fn test_modes_are_domain_separated() {
        // tokenB = "123456" makes the ikm bytes of both modes overlap as much as possible
        let pair = derive_pair_key(TOKEN_A, "123456").unwrap();
        let pin = derive_pin_key(TOKEN_A, &Pin::parse("123456").unwrap()).unwrap();
        assert_ne!(pair.as_bytes(), pin.as_bytes());
    }

    #[test]
    fn test_debug_redacts() {
        let key = DerivedKey::from_bytes([7u8; KEY_SIZE]);
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
