//! Seed/key derivation for the EPS

use crate::{DiagError, DiagServerResult};

/// Access mode used to request the seed. The key is sent on the following mode (0x04)
pub const SECURITY_ACCESS_MODE: u8 = 0x03;

/// Constant added to the seed to produce the key
pub const SECURITY_ACCESS_CONSTANT: u32 = 28183;

/// Computes the key for a seed. Addition wraps at 2^32
pub const fn compute_key(seed: u32) -> u32 {
    seed.wrapping_add(SECURITY_ACCESS_CONSTANT)
}

/// One seed/key pair. Only lives for a single handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecuritySession {
    /// Seed issued by the ECU
    pub seed: u32,
    /// Key derived from the seed
    pub key: u32,
}

impl SecuritySession {
    /// Builds the pair from the raw seed bytes of the ECU, which must be a 4 byte big endian value
    pub fn from_seed_bytes(seed: &[u8]) -> DiagServerResult<Self> {
        let seed: [u8; 4] = seed
            .try_into()
            .map_err(|_| DiagError::InvalidResponseLength)?;
        let seed = u32::from_be_bytes(seed);
        Ok(Self {
            seed,
            key: compute_key(seed),
        })
    }

    /// The key, as sent to the ECU
    pub fn key_bytes(&self) -> [u8; 4] {
        self.key.to_be_bytes()
    }
}
