//! Field encryption primitives: the algorithm registry and the envelope engine.
//!
//! This module only knows about bytes and key identifiers. Record shapes live in
//! [`crate::record`], key material in [`crate::keys`].

pub mod algorithm;
pub mod cipher;

pub use algorithm::{AlgorithmError, AlgorithmId, CryptoAlgorithm, DEFAULT_ALGORITHM};
pub use cipher::{
    CipherError, FieldCipher, FieldMetadata, IDENTIFIER_DELIMITER_DEFAULT,
    VERSION_DELIMITER_DEFAULT,
};
