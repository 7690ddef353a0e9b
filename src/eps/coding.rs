//! EPS coding data
//!
//! The coding is an opaque bitmap of 1 to 4 bytes depending on the ECU. Only bit 4 of the
//! first byte is understood, it enables heading control assist. Every other bit is written
//! back exactly as it was read.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Known flags of the first coding byte. Unknown bits are retained
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CodingByte0: u8 {
        /// Heading control assist (lane assist) steering torque requests are accepted
        const HEADING_CONTROL_ASSIST = 1 << 4;
    }
}

/// Raw coding data, as read from and written to the coding identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CodingBlob(Vec<u8>);

impl CodingBlob {
    /// Wraps raw coding bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The raw coding bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of coding bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the ECU reported no coding at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn byte0(&self) -> Option<CodingByte0> {
        self.0.first().map(|b| CodingByte0::from_bits_retain(*b))
    }

    /// Returns whether heading control assist is enabled, or None if the coding is empty
    pub fn assist_enabled(&self) -> Option<bool> {
        self.byte0()
            .map(|b| b.contains(CodingByte0::HEADING_CONTROL_ASSIST))
    }

    /// Returns a copy of this coding with heading control assist set or cleared.
    /// The length and every other bit are unchanged. Returns None if the coding is empty
    pub fn with_assist(&self, enable: bool) -> Option<Self> {
        let mut byte0 = self.byte0()?;
        byte0.set(CodingByte0::HEADING_CONTROL_ASSIST, enable);
        let mut bytes = self.0.clone();
        bytes[0] = byte0.bits();
        Some(Self(bytes))
    }

    /// Returns true if `other` has the same length and differs from this coding
    /// at most in the heading control assist bit
    pub fn differs_only_in_assist(&self, other: &CodingBlob) -> bool {
        if self.len() != other.len() || self.is_empty() {
            return false;
        }
        let mask = !CodingByte0::HEADING_CONTROL_ASSIST.bits();
        self.0[0] & mask == other.0[0] & mask && self.0[1..] == other.0[1..]
    }
}

impl From<Vec<u8>> for CodingBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for CodingBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::hex_string(&self.0))
    }
}
