//! Presentation seal for gate envelopes.
//!
//! The hash covers the canonical JSON of the payload salted with the sealing
//! time in milliseconds. Nothing retains the salt, so a seal identifies a
//! response for display purposes only and cannot be verified.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use floorgate_types::{Seal, SealedEnvelope};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::clock::Clock;

pub const SEAL_VERSION: &str = "2.0";
pub const SEAL_HASH_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum SealError {
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct Sealer {
    clock: Arc<dyn Clock>,
    version: String,
}

impl Sealer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            version: SEAL_VERSION.to_string(),
        }
    }

    pub fn seal<T: Serialize>(&self, payload: T) -> Result<SealedEnvelope<T>, SealError> {
        let timestamp = self.clock.now();
        let canonical = serde_json::to_vec(&payload)?;

        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hasher.update(timestamp.timestamp_millis().to_string().as_bytes());
        let mut hash = STANDARD.encode(hasher.finalize());
        hash.truncate(SEAL_HASH_LEN);

        Ok(SealedEnvelope {
            payload,
            seal: Seal {
                sealed: true,
                timestamp,
                hash,
                version: self.version.clone(),
            },
        })
    }
}
