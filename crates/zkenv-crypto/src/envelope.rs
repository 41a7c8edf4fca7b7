//! AES-256-GCM value envelopes
//!
//! Envelope format (text):
//! ```text
//! base64url( [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag] )
//! ```
//!
//! Encoding emits `=` padding; decoding accepts padded and unpadded input.
//! No associated data: the envelope is bound to its key, not to its variable name.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use rand::rngs::OsRng;
use rand::RngCore;
use zkenv_core::{ZkenvError, ZkenvResult};

use crate::kdf::DerivedKey;
use crate::{NONCE_SIZE, TAG_SIZE};

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// One encrypted value: nonce plus ciphertext with the tag appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    nonce: [u8; NONCE_SIZE],
    ciphertext_and_tag: Vec<u8>,
}

impl Envelope {
    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    pub fn ciphertext_and_tag(&self) -> &[u8] {
        &self.ciphertext_and_tag
    }

    /// `nonce ‖ ciphertext ‖ tag`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_SIZE + self.ciphertext_and_tag.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext_and_tag);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> ZkenvResult<Self> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(ZkenvError::MalformedRecord(format!(
                "envelope too short: {} bytes (minimum {})",
                bytes.len(),
                NONCE_SIZE + TAG_SIZE
            )));
        }
        let (nonce, rest) = bytes.split_at(NONCE_SIZE);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);
        Ok(Self {
            nonce: nonce_bytes,
            ciphertext_and_tag: rest.to_vec(),
        })
    }

    pub fn to_text(&self) -> String {
        URL_SAFE_LENIENT.encode(self.to_bytes())
    }

    pub fn from_text(text: &str) -> ZkenvResult<Self> {
        let bytes = URL_SAFE_LENIENT
            .decode(text.trim())
            .map_err(|e| ZkenvError::MalformedRecord(format!("envelope is not base64url: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl std::str::FromStr for Envelope {
    type Err = ZkenvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn seal(plaintext: &[u8], key: &DerivedKey) -> ZkenvResult<Envelope> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext_and_tag = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow::anyhow!("value encryption failed: {e}"))?;

    Ok(Envelope {
        nonce: nonce_bytes,
        ciphertext_and_tag,
    })
}

/// Decrypt and authenticate an envelope.
///
/// Every failure is reported as `Authentication`, whatever the cause.
pub fn open(envelope: &Envelope, key: &DerivedKey) -> ZkenvResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(&envelope.nonce);
    cipher
        .decrypt(nonce, envelope.ciphertext_and_tag.as_ref())
        .map_err(|_| ZkenvError::Authentication)
}
