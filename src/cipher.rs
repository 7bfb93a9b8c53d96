//! Reversible transforms applied to candidate identifiers before they are
//! stored or transmitted.
//!
//! Two transforms share the `decode(encode(x)) == x` contract:
//!
//! - [`shift`]: a keyless code-point shift. Obfuscation only; anyone can
//!   reverse it. Output is stable across calls. Retained for values written
//!   by the legacy system.
//! - [`VoteSealer`]: XChaCha20-Poly1305 under a process-wide secret key,
//!   with a fresh random nonce per call. Output differs on every call and
//!   tampered ciphertext fails loudly instead of decoding to garbage. This
//!   is the transform the vote path uses.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use data_encoding::BASE64;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key length of XChaCha20-Poly1305 in bytes.
pub const KEY_LEN: usize = 32;

/// Nonce length of XChaCha20-Poly1305 in bytes.
pub const NONCE_LEN: usize = 24;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("secret key must be exactly {KEY_LEN} bytes, got {0}")]
    KeyLength(usize),
    #[error("nonce must be exactly {NONCE_LEN} bytes, got {0}")]
    NonceLength(usize),
    #[error("invalid base64: {0}")]
    Base64(#[from] data_encoding::DecodeError),
    #[error("malformed sealed value: {0}")]
    Wire(#[from] serde_json::Error),
    #[error("sealing failed")]
    Seal,
    #[error("sealed value failed authentication")]
    Tampered,
    #[error("sealed value is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("code point {0:#x} cannot be shifted")]
    Shift(u32),
}

/// Transform A: shift every code point by a fixed constant.
pub mod shift {
    use super::CipherError;

    /// How far each code point moves.
    const SHIFT: u32 = 3;

    /// Shift every character of `plain` up by the fixed constant.
    ///
    /// Fails instead of wrapping if any shifted code point would leave the
    /// valid `char` range.
    pub fn encode(plain: &str) -> Result<String, CipherError> {
        plain
            .chars()
            .map(|c| char::from_u32(c as u32 + SHIFT).ok_or(CipherError::Shift(c as u32)))
            .collect()
    }

    /// Reverse [`encode`].
    pub fn decode(encoded: &str) -> Result<String, CipherError> {
        encoded
            .chars()
            .map(|c| {
                (c as u32)
                    .checked_sub(SHIFT)
                    .and_then(char::from_u32)
                    .ok_or(CipherError::Shift(c as u32))
            })
            .collect()
    }
}

/// Wire format of a sealed value: a JSON object with base64 `nonce` and
/// `box` fields.
#[derive(Serialize, Deserialize)]
struct SealedValue {
    nonce: String,
    #[serde(rename = "box")]
    boxed: String,
}

/// Transform B: an authenticated secret box over candidate identifiers.
///
/// Built once at startup from the `vote_secret` config key; see
/// [`crate::config::ConfigFairing`]. Stateless per call apart from the key.
pub struct VoteSealer {
    cipher: XChaCha20Poly1305,
}

impl VoteSealer {
    /// Construct from a base64-encoded 32-byte key.
    pub fn from_base64_key(key: &str) -> Result<Self, CipherError> {
        let bytes = BASE64.decode(key.as_bytes())?;
        if bytes.len() != KEY_LEN {
            return Err(CipherError::KeyLength(bytes.len()));
        }
        Ok(Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(&bytes)),
        })
    }

    /// Seal `plain` under a fresh random nonce.
    ///
    /// Not idempotent: the same input seals to a different wire string on
    /// every call.
    pub fn seal(&self, plain: &str) -> Result<String, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let boxed = self
            .cipher
            .encrypt(XNonce::from_slice(&nonce), plain.as_bytes())
            .map_err(|_| CipherError::Seal)?;
        let sealed = SealedValue {
            nonce: BASE64.encode(&nonce),
            boxed: BASE64.encode(&boxed),
        };
        Ok(serde_json::to_string(&sealed)?)
    }

    /// Open a wire string produced by [`seal`](Self::seal).
    ///
    /// Fails with [`CipherError::Tampered`] if the ciphertext does not
    /// authenticate under our key; callers never see a default value that
    /// could be mistaken for a valid plaintext.
    pub fn open(&self, wire: &str) -> Result<String, CipherError> {
        let sealed: SealedValue = serde_json::from_str(wire)?;
        let nonce = BASE64.decode(sealed.nonce.as_bytes())?;
        if nonce.len() != NONCE_LEN {
            return Err(CipherError::NonceLength(nonce.len()));
        }
        let boxed = BASE64.decode(sealed.boxed.as_bytes())?;
        let plain = self
            .cipher
            .decrypt(XNonce::from_slice(&nonce), boxed.as_slice())
            .map_err(|_| CipherError::Tampered)?;
        Ok(String::from_utf8(plain)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealer() -> VoteSealer {
        VoteSealer::from_base64_key(&BASE64.encode(&[7; KEY_LEN])).unwrap()
    }

    #[test]
    fn shift_round_trips_printable_ascii() {
        let all_printable: String = (0x20u8..0x7f).map(char::from).collect();
        let encoded = shift::encode(&all_printable).unwrap();
        assert_ne!(all_printable, encoded);
        assert_eq!(all_printable, shift::decode(&encoded).unwrap());
    }

    #[test]
    fn shift_is_stable() {
        assert_eq!(shift::encode("bongbong").unwrap(), shift::encode("bongbong").unwrap());
    }

    #[test]
    fn shift_rejects_out_of_range() {
        // char::MAX + 3 is not a valid code point.
        assert!(shift::encode("\u{10FFFF}").is_err());
        // Decoding below zero is also an error.
        assert!(shift::decode("\u{0}").is_err());
    }

    #[test]
    fn seal_round_trips() {
        let sealer = sealer();
        for plain in ["", "c", "candidate-641f2b", "ñandú 中文 🗳"] {
            let wire = sealer.seal(plain).unwrap();
            assert_eq!(plain, sealer.open(&wire).unwrap());
        }
    }

    #[test]
    fn seal_uses_fresh_nonces() {
        let sealer = sealer();
        let first = sealer.seal("candidate-641f2b").unwrap();
        let second = sealer.seal("candidate-641f2b").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn wire_format_has_nonce_and_box() {
        let wire = sealer().seal("candidate-641f2b").unwrap();
        let value: serde_json::Value = serde_json::from_str(&wire).unwrap();
        assert!(value.get("nonce").is_some());
        assert!(value.get("box").is_some());
    }

    #[test]
    fn tampered_box_fails_loudly() {
        let sealer = sealer();
        let wire = sealer.seal("candidate-641f2b").unwrap();

        // Flip one byte of the ciphertext.
        let mut sealed: SealedValue = serde_json::from_str(&wire).unwrap();
        let mut boxed = BASE64.decode(sealed.boxed.as_bytes()).unwrap();
        boxed[0] ^= 0x01;
        sealed.boxed = BASE64.encode(&boxed);
        let tampered = serde_json::to_string(&sealed).unwrap();

        assert!(matches!(
            sealer.open(&tampered),
            Err(CipherError::Tampered)
        ));
    }

    #[test]
    fn wrong_key_fails_loudly() {
        let wire = sealer().seal("candidate-641f2b").unwrap();
        let other = VoteSealer::from_base64_key(&BASE64.encode(&[8; KEY_LEN])).unwrap();
        assert!(matches!(other.open(&wire), Err(CipherError::Tampered)));
    }

    #[test]
    fn short_key_is_rejected() {
        assert!(matches!(
            VoteSealer::from_base64_key(&BASE64.encode(&[1; 16])),
            Err(CipherError::KeyLength(16))
        ));
    }

    #[test]
    fn garbage_wire_is_rejected() {
        let sealer = sealer();
        assert!(sealer.open("not json at all").is_err());
        assert!(sealer.open(r#"{"nonce":"AAA=","box":"AAA="}"#).is_err());
    }
}
