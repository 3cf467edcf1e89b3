//! Registry of supported AEAD algorithms.
//!
//! Algorithm names map to a compact numeric [`AlgorithmId`], and ids map to a
//! [`CryptoAlgorithm`] implementation. Both tables are `const` and never change at
//! runtime.
//!
//! Every algorithm emits `nonce || ciphertext+tag` with a fresh 96-bit nonce drawn
//! from the OS CSPRNG per call.

use aes_gcm::{Aes128Gcm, Aes256Gcm};
use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes128GcmSiv, Aes256GcmSiv, Nonce,
};
use thiserror::Error;

/// Byte length of every supported nonce (96 bits).
pub const NONCE_LEN: usize = 12;

/// Name of the algorithm used when neither the field nor the settings pick one.
pub const DEFAULT_ALGORITHM: &str = "AES/GCM/NoPadding";

/// Compact identifier of a registered algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlgorithmId(pub u8);

/// Algorithm name to id lookup table.
pub const CIPHER_NAME_IDS: &[(&str, AlgorithmId)] = &[
    ("AES/GCM/NoPadding", AlgorithmId(1)),
    ("AES/GCM-SIV/NoPadding", AlgorithmId(2)),
];

static AES_GCM: AesGcmNoPadding = AesGcmNoPadding;
static AES_GCM_SIV: AesGcmSivNoPadding = AesGcmSivNoPadding;

/// Errors produced by an algorithm implementation.
#[derive(Debug, Error)]
pub enum AlgorithmError {
    /// The key is neither 16 nor 32 bytes long.
    #[error("invalid key length: expected 16 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// The input is too short to contain a nonce.
    #[error("ciphertext shorter than nonce")]
    Truncated,

    /// AEAD encryption or decryption failed (wrong key or tampered data).
    #[error("aead operation failed")]
    AeadFailure,
}

/// A symmetric cipher usable by the cipher engine.
pub trait CryptoAlgorithm: Send + Sync {
    /// Encrypt `plaintext` under `key`.
    fn cipher(&self, plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, AlgorithmError>;

    /// Decrypt bytes produced by [`CryptoAlgorithm::cipher`] with the same key.
    fn decipher(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, AlgorithmError>;
}

/// Resolve an algorithm name to its id.
pub fn algorithm_id(name: &str) -> Option<AlgorithmId> {
    CIPHER_NAME_IDS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, id)| *id)
}

/// Resolve an id to its implementation.
pub fn algorithm(id: AlgorithmId) -> Option<&'static dyn CryptoAlgorithm> {
    match id.0 {
        1 => Some(&AES_GCM),
        2 => Some(&AES_GCM_SIV),
        _ => None,
    }
}

/// AES-GCM with a 128- or 256-bit key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmNoPadding;

/// AES-GCM-SIV (RFC 8452) with a 128- or 256-bit key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmSivNoPadding;

/// Implements [`CryptoAlgorithm`] for a pair of 128/256-bit AEAD ciphers sharing the
/// 96-bit nonce type.
macro_rules! aead_algorithm {
    ($name:ty, $aes128:ty, $aes256:ty) => {
        impl CryptoAlgorithm for $name {
            fn cipher(&self, plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, AlgorithmError> {
                let mut nonce = [0u8; NONCE_LEN];
                OsRng.fill_bytes(&mut nonce);
                let nonce_ref = Nonce::from_slice(&nonce);
                let sealed = match key.len() {
                    16 => <$aes128>::new_from_slice(key)
                        .map_err(|_| AlgorithmError::InvalidKeyLength(key.len()))?
                        .encrypt(nonce_ref, plaintext),
                    32 => <$aes256>::new_from_slice(key)
                        .map_err(|_| AlgorithmError::InvalidKeyLength(key.len()))?
                        .encrypt(nonce_ref, plaintext),
                    n => return Err(AlgorithmError::InvalidKeyLength(n)),
                }
                .map_err(|_| AlgorithmError::AeadFailure)?;

                let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
                out.extend_from_slice(&nonce);
                out.extend_from_slice(&sealed);
                Ok(out)
            }

            fn decipher(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, AlgorithmError> {
                if ciphertext.len() < NONCE_LEN {
                    return Err(AlgorithmError::Truncated);
                }
                let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
                let nonce = Nonce::from_slice(nonce);
                match key.len() {
                    16 => <$aes128>::new_from_slice(key)
                        .map_err(|_| AlgorithmError::InvalidKeyLength(key.len()))?
                        .decrypt(nonce, sealed),
                    32 => <$aes256>::new_from_slice(key)
                        .map_err(|_| AlgorithmError::InvalidKeyLength(key.len()))?
                        .decrypt(nonce, sealed),
                    n => return Err(AlgorithmError::InvalidKeyLength(n)),
                }
                .map_err(|_| AlgorithmError::AeadFailure)
            }
        }
    };
}

aead_algorithm!(AesGcmNoPadding, Aes128Gcm, Aes256Gcm);
aead_algorithm!(AesGcmSivNoPadding, Aes128GcmSiv, Aes256GcmSiv);
