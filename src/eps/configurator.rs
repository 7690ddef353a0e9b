use log::{info, warn};

use crate::{
    channel::IsoTPSettings,
    hardware::Hardware,
    session::{DiagSession, SessionType, TargetDescriptor},
};

use super::{is_variant_supported, CodingBlob, EpsError, IdentitySet};

/// Outcome of a successful coding change
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FeatureChange {
    /// Identity read before the change
    pub identity: IdentitySet,
    /// Coding before the change
    pub previous: CodingBlob,
    /// Coding the EPS accepted
    pub written: CodingBlob,
    /// True if the coding was read back and matched
    pub verified: bool,
}

impl FeatureChange {
    /// Returns true if the written coding is the same as the previous one
    pub fn unchanged(&self) -> bool {
        self.previous == self.written
    }
}

/// Runs complete EPS workflows over one diagnostic session
#[derive(Debug)]
pub struct EpsConfigurator {
    session: DiagSession,
}

impl EpsConfigurator {
    /// Creates a diagnostic session with the EPS over the hardware.
    /// The hardware must already be in diagnostic mode
    pub fn new<H: Hardware + ?Sized>(
        hw: &mut H,
        target: TargetDescriptor,
        channel_cfg: IsoTPSettings,
    ) -> Result<Self, EpsError> {
        let session =
            DiagSession::new_over_iso_tp(hw, target, channel_cfg).map_err(EpsError::Channel)?;
        Ok(Self { session })
    }

    /// Wraps an existing session
    pub fn from_session(session: DiagSession) -> Self {
        Self { session }
    }

    /// The underlying diagnostic session
    pub fn session(&mut self) -> &mut DiagSession {
        &mut self.session
    }

    /// Returns the underlying diagnostic session
    pub fn into_session(self) -> DiagSession {
        self.session
    }

    /// Reads the identity of the EPS in a default session. Nothing is written
    pub fn show(&mut self) -> Result<IdentitySet, EpsError> {
        self.session.open(SessionType::Default)?;
        Ok(self.session.eps_read_identity()?)
    }

    /// Enables or disables heading control assist.
    ///
    /// Opens an extended session, reads the identity and refuses to continue unless the
    /// dataset is supported, in which case no security access is attempted. With `verify`, the
    /// coding is read back after the write.
    pub fn set_feature(&mut self, enable: bool, verify: bool) -> Result<FeatureChange, EpsError> {
        self.session.open(SessionType::Extended)?;
        let identity = self.session.eps_read_identity()?;
        if !is_variant_supported(&identity) {
            let dataset = String::from_utf8_lossy(identity.dataset_raw()).into_owned();
            warn!("Unsupported EPS dataset {dataset:?}, not changing coding");
            return Err(EpsError::UnsupportedVariant { dataset });
        }
        let previous = identity.coding();
        if previous.assist_enabled() == Some(enable) {
            info!("Heading control assist already in the requested state, writing anyway");
        }
        let written = self.session.eps_set_feature(enable, &identity)?;
        if verify {
            self.session.eps_verify_coding(&written)?;
        }
        Ok(FeatureChange {
            identity,
            previous,
            written,
            verified: verify,
        })
    }
}
