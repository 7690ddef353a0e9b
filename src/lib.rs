#![warn(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications,
    clippy::uninlined_format_args
)]

//! A crate for talking to the electronic power steering (EPS) control unit of MQB platform
//! vehicles over UDS, in order to read its identification data and to toggle the coding bit
//! which enables or disables the heading control assist (HCA, lane assist) feature.
//!
//! ## Layers
//!
//! ### Hardware and channels
//! The [hardware] module abstracts the diagnostic adapter. An adapter exposes whether it has
//! a secondary bus, a one time diagnostic mode selection, and creates ISO-TP [channel]s on a
//! given bus. Frame segmentation and reassembly is owned by the channel, not by this crate.
//!
//! ### Session
//! [session::DiagSession] is the session context. It owns the ISO-TP channel for the whole
//! lifetime of one workflow, tracks which diagnostic session is active on the ECU, and whether
//! security access has been granted in that session.
//!
//! ### UDS services
//! The [uds] module implements the four ISO14229 services this tool needs on top of
//! [session::DiagSession]: diagnostic session control, security access, and read/write data by
//! identifier.
//!
//! ### EPS coding
//! The [eps] module reads the identity of the EPS, checks the dataset variant, performs the
//! seed/key exchange and writes the modified coding back.
//!
//! ## Safety
//! Writing coding data to a vehicle ECU changes how the vehicle behaves. Only bit 4 of the
//! first coding byte is ever modified, and only on the dataset variant whose layout is known.

use std::sync::Arc;

use channel::ChannelError;
use hardware::HardwareError;

pub mod channel;
pub mod eps;
pub mod hardware;
pub mod session;
pub mod uds;

pub use automotive_diag::ByteWrapper::*;

/// Diagnostic server result
pub type DiagServerResult<T> = Result<T, DiagError>;

#[derive(Clone, Debug, thiserror::Error)]
/// Diagnostic server error
pub enum DiagError {
    /// Diagnostic error code from the ECU itself
    #[error("ECU Negative response. Error 0x{:02X?}, definition: {:?}", code, def)]
    ECUError {
        /// Raw Negative response code from ECU
        code: u8,
        /// Negative response code definition according to protocol
        def: Option<String>,
    },
    /// ECU did not reply within the configured timeout
    #[error("ECU did not respond within the timeout")]
    Timeout,
    /// Response empty
    #[error("ECU did not respond to the request")]
    EmptyResponse,
    /// ECU Responded but send a message that wasn't a reply for the sent message
    #[error("ECU response is out of order")]
    WrongMessage,
    /// ECU Responded with a message, but the length was incorrect
    #[error("ECU response size was not the correct length")]
    InvalidResponseLength,
    /// A parameter given to the function is invalid. Check the function's documentation
    /// for more information
    #[error("Diagnostic function parameter invalid")]
    ParameterInvalid,
    /// Error with underlying communication channel
    #[error("Diagnostic server hardware channel error")]
    ChannelError(
        #[from]
        #[source]
        Arc<ChannelError>,
    ),
    /// Device hardware error
    #[error("Diagnostic server hardware error")]
    HardwareError(
        #[from]
        #[source]
        Arc<HardwareError>,
    ),
    /// Mismatched identifier response
    #[error(
        "Requested Ident 0x{:04X?}, but received ident 0x{:04X?}",
        want,
        received
    )]
    MismatchedIdentResponse {
        /// Requested identifier
        want: u16,
        /// Received identifier from ECU
        received: u16,
    },
}

impl DiagError {
    /// Returns true if the error means the ECU never answered
    pub fn is_timeout(&self) -> bool {
        matches!(self, DiagError::Timeout)
    }

    /// Returns the negative response code if the ECU rejected the request
    pub fn nrc(&self) -> Option<u8> {
        match self {
            DiagError::ECUError { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<ChannelError> for DiagError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::ReadTimeout | ChannelError::BufferEmpty => DiagError::Timeout,
            e => DiagError::ChannelError(Arc::new(e)),
        }
    }
}

impl From<HardwareError> for DiagError {
    fn from(e: HardwareError) -> Self {
        DiagError::HardwareError(Arc::new(e))
    }
}

/// Formats a byte slice as a contiguous lowercase hex string, as printed by diagnostic testers
pub fn hex_string(input: &[u8]) -> String {
    input.iter().map(|b| format!("{b:02x}")).collect()
}
