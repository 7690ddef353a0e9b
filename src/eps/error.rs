use strum_macros::Display;

use crate::{hardware::HardwareError, session::SessionError, session::SessionState, DiagError};

use super::{coding::CodingBlob, identity::EpsIdentifier};

/// Progress of a coding change. Used to report where a change stopped
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
pub enum SetFeatureStage {
    /// Waiting for the security seed
    #[strum(to_string = "requesting seed")]
    SeedRequested,
    /// Waiting for the ECU to accept the key
    #[strum(to_string = "sending key")]
    KeySent,
    /// Key accepted
    #[strum(to_string = "authenticated")]
    Authenticated,
    /// Waiting for the ECU to accept the new coding
    #[strum(to_string = "writing coding")]
    WritePending,
    /// New coding accepted
    #[strum(to_string = "committed")]
    Committed,
}

/// Failure reading an identification record. Aborts the whole identity read
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReadError {
    /// Negative response to the read
    #[error("EPS rejected reading {identifier} (0x{:04X}): NRC 0x{code:02X} {}", .identifier.did(), .def.as_deref().unwrap_or("unknown"))]
    Rejected {
        /// Identifier being read
        identifier: EpsIdentifier,
        /// Negative response code
        code: u8,
        /// Name of the negative response code
        def: Option<String>,
    },
    /// No response to the read
    #[error("Timeout reading {identifier} (0x{:04X}) from EPS", .identifier.did())]
    Timeout {
        /// Identifier being read
        identifier: EpsIdentifier,
    },
    /// Malformed response, or a channel failure
    #[error("Error reading {identifier} (0x{:04X}) from EPS", .identifier.did())]
    Protocol {
        /// Identifier being read
        identifier: EpsIdentifier,
        /// Underlying error
        #[source]
        source: DiagError,
    },
}

impl ReadError {
    pub(crate) fn from_diag(identifier: EpsIdentifier, e: DiagError) -> Self {
        match e {
            DiagError::Timeout => ReadError::Timeout { identifier },
            DiagError::ECUError { code, def } => ReadError::Rejected {
                identifier,
                code,
                def,
            },
            source => ReadError::Protocol { identifier, source },
        }
    }

    /// Identifier whose read failed
    pub fn identifier(&self) -> EpsIdentifier {
        match self {
            ReadError::Rejected { identifier, .. }
            | ReadError::Timeout { identifier }
            | ReadError::Protocol { identifier, .. } => *identifier,
        }
    }
}

/// Failure changing the EPS coding
#[derive(Debug, Clone, thiserror::Error)]
pub enum WriteError {
    /// Coding changes need an extended session, nothing was sent
    #[error("EPS must be in an extended session to change coding (currently {0})")]
    SessionNotExtended(SessionState),
    /// The EPS reported an empty coding, so there is no bit to change
    #[error("EPS coding is empty")]
    EmptyCoding,
    /// The new coding changes more than the heading control assist bit. Nothing was sent
    #[error("Refusing to write coding {requested}, only the assist bit of {current} may change")]
    ForeignCodingChange {
        /// Coding read from the EPS
        current: CodingBlob,
        /// Coding that would have been written
        requested: CodingBlob,
    },
    /// The EPS refused the seed request or the key. No write was attempted
    #[error("Security access denied by EPS: NRC 0x{code:02X} {}", .def.as_deref().unwrap_or("unknown"))]
    SecurityAccessDenied {
        /// Negative response code
        code: u8,
        /// Name of the negative response code
        def: Option<String>,
    },
    /// The key was accepted but the session no longer permits writing
    #[error("EPS is not unlocked for writing")]
    NotAuthenticated,
    /// No response while in `stage`
    #[error("Timeout from EPS while {stage}")]
    Timeout {
        /// Stage that timed out
        stage: SetFeatureStage,
    },
    /// The EPS refused the new coding. Its stored coding is unchanged
    #[error("EPS rejected the coding write: NRC 0x{code:02X} {}", .def.as_deref().unwrap_or("unknown"))]
    WriteRejected {
        /// Negative response code
        code: u8,
        /// Name of the negative response code
        def: Option<String>,
    },
    /// Malformed response, or a channel failure
    #[error("Protocol error from EPS while {stage}")]
    Protocol {
        /// Stage that failed
        stage: SetFeatureStage,
        /// Underlying error
        #[source]
        source: DiagError,
    },
    /// Reading the coding back after the write failed
    #[error("Could not read back coding after write")]
    VerificationRead(#[source] ReadError),
    /// The EPS reports a different coding than the one written
    #[error("EPS coding is {actual} after writing {expected}")]
    VerificationMismatch {
        /// Coding written
        expected: CodingBlob,
        /// Coding read back
        actual: CodingBlob,
    },
}

impl WriteError {
    pub(crate) fn from_diag(stage: SetFeatureStage, e: DiagError) -> Self {
        match (stage, e) {
            (stage, DiagError::Timeout) => WriteError::Timeout { stage },
            (
                SetFeatureStage::SeedRequested | SetFeatureStage::KeySent,
                DiagError::ECUError { code, def },
            ) => WriteError::SecurityAccessDenied { code, def },
            (SetFeatureStage::WritePending, DiagError::ECUError { code, def }) => {
                WriteError::WriteRejected { code, def }
            }
            (stage, source) => WriteError::Protocol { stage, source },
        }
    }
}

/// Failure of a complete EPS workflow
#[derive(Debug, thiserror::Error)]
pub enum EpsError {
    /// Adapter failure before any diagnostic traffic
    #[error("Diagnostic adapter error")]
    Hardware(#[from] HardwareError),
    /// Could not create the diagnostic session
    #[error("Could not set up diagnostic channel")]
    Channel(#[source] DiagError),
    /// Session control failed
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Reading the identity failed
    #[error(transparent)]
    Read(#[from] ReadError),
    /// The dataset is not one whose coding layout is known. Nothing was written
    #[error("Configuration changes not supported on this EPS (dataset {dataset:?})")]
    UnsupportedVariant {
        /// Dataset file name reported by the EPS
        dataset: String,
    },
    /// Changing the coding failed
    #[error(transparent)]
    Write(#[from] WriteError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_errors_keep_identifier() {
        let e = ReadError::from_diag(EpsIdentifier::DatasetFile, DiagError::Timeout);
        assert!(matches!(e, ReadError::Timeout { .. }));
        assert_eq!(e.identifier(), EpsIdentifier::DatasetFile);
        assert_eq!(e.to_string(), "Timeout reading ASAM Dataset (0xF19E) from EPS");

        let e = ReadError::from_diag(
            EpsIdentifier::Coding,
            DiagError::ECUError {
                code: 0x31,
                def: Some("RequestOutOfRange".into()),
            },
        );
        assert_eq!(
            e.to_string(),
            "EPS rejected reading Coding (0x0600): NRC 0x31 RequestOutOfRange"
        );
    }

    #[test]
    fn write_errors_depend_on_stage() {
        let nrc = || DiagError::ECUError {
            code: 0x35,
            def: None,
        };
        assert!(matches!(
            WriteError::from_diag(SetFeatureStage::KeySent, nrc()),
            WriteError::SecurityAccessDenied { code: 0x35, .. }
        ));
        assert!(matches!(
            WriteError::from_diag(SetFeatureStage::SeedRequested, nrc()),
            WriteError::SecurityAccessDenied { .. }
        ));
        assert!(matches!(
            WriteError::from_diag(SetFeatureStage::WritePending, nrc()),
            WriteError::WriteRejected { code: 0x35, .. }
        ));
        assert!(matches!(
            WriteError::from_diag(SetFeatureStage::WritePending, DiagError::Timeout),
            WriteError::Timeout {
                stage: SetFeatureStage::WritePending
            }
        ));
    }
}
