// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Unlocked signing key.
//!
//! Keys arrive PEM-encoded (SEC1 or PKCS#8) or as raw hex. An
//! [`UnlockedKey`] is moved into a single dispatch and dropped with it;
//! nothing in the bridge keeps one around between requests.

use std::fmt;

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use k256::SecretKey;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Invalid PEM: {0}")]
    Pem(#[from] pem::PemError),

    #[error("Invalid key format: {0}")]
    Format(String),
}

/// Private key unlocked for exactly one dispatch.
pub struct UnlockedKey {
    signer: PrivateKeySigner,
}

impl UnlockedKey {
    /// Parse a PEM-encoded secp256k1 key.
    pub fn from_pem(pem_bytes: &[u8]) -> Result<Self, KeyError> {
        let pem_str = std::str::from_utf8(pem_bytes)?;
        let pem = pem::parse(pem_str)?;

        let secret_key = SecretKey::from_sec1_der(pem.contents())
            .or_else(|_| {
                use k256::pkcs8::DecodePrivateKey;
                SecretKey::from_pkcs8_der(pem.contents())
            })
            .map_err(|e| KeyError::Format(e.to_string()))?;

        let signer = PrivateKeySigner::from_slice(&secret_key.to_bytes())
            .map_err(|e| KeyError::Format(e.to_string()))?;
        Ok(Self { signer })
    }

    /// Parse a hex-encoded 32-byte key, with or without `0x`.
    pub fn from_hex(private_key_hex: &str) -> Result<Self, KeyError> {
        let key_bytes = alloy::hex::decode(private_key_hex.trim())
            .map_err(|e| KeyError::Format(e.to_string()))?;
        let signer =
            PrivateKeySigner::from_slice(&key_bytes).map_err(|e| KeyError::Format(e.to_string()))?;
        Ok(Self { signer })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub(crate) fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    pub(crate) fn into_signer(self) -> PrivateKeySigner {
        self.signer
    }
}

impl fmt::Debug for UnlockedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockedKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
