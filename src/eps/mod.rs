//! Electric power steering (EPS) identification and coding
//!
//! The EPS is identified by reading a fixed list of identifiers, in a fixed order. Heading
//! control assist is toggled by rewriting the coding record with bit 4 of its first byte
//! changed, after unlocking the ECU with a seed/key exchange.
//!
//! The engine operations are methods on [DiagSession], prefixed with `eps_`. [EpsConfigurator]
//! runs complete workflows with them.

use log::{debug, error, info, warn};
use strum::IntoEnumIterator;

use crate::session::{DiagSession, SessionState};

mod coding;
mod configurator;
mod error;
mod identity;
mod security;

pub use coding::*;
pub use configurator::*;
pub use error::*;
pub use identity::*;
pub use security::*;

impl DiagSession {
    /// Reads a single identification record
    pub fn eps_read_identifier(
        &mut self,
        identifier: EpsIdentifier,
    ) -> Result<IdentifierRecord, ReadError> {
        let raw = self
            .uds_read_data_by_identifier(identifier.did())
            .map_err(|e| ReadError::from_diag(identifier, e))?;
        debug!("{identifier} (0x{:04X}): {raw:02X?}", identifier.did());
        Ok(IdentifierRecord { identifier, raw })
    }

    /// Reads every identification record, in order.
    ///
    /// The first failing read aborts the sequence. No partial result is returned and no
    /// further identifiers are requested
    pub fn eps_read_identity(&mut self) -> Result<IdentitySet, ReadError> {
        let records = EpsIdentifier::iter()
            .map(|id| self.eps_read_identifier(id))
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|e| error!("Identity read aborted: {e}"))?;
        // Every identifier was read in order, so the set is always complete here
        match IdentitySet::from_records(records) {
            Some(set) => Ok(set),
            None => Err(ReadError::Protocol {
                identifier: EpsIdentifier::Coding,
                source: crate::DiagError::InvalidResponseLength,
            }),
        }
    }

    /// Enables or disables heading control assist.
    ///
    /// `identity` must be the result of [DiagSession::eps_read_identity] in the current session;
    /// its coding is the base of the new coding. The session must already be extended, otherwise
    /// nothing is sent. Every request is sent once, a rejected key is not retried.
    ///
    /// Checking that the EPS variant is supported is the caller's job, see
    /// [is_variant_supported].
    ///
    /// ## Returns
    /// The coding that the EPS accepted
    pub fn eps_set_feature(
        &mut self,
        enable: bool,
        identity: &IdentitySet,
    ) -> Result<CodingBlob, WriteError> {
        self.check_extended()?;
        let current = identity.coding();
        let new_coding = current.with_assist(enable).ok_or(WriteError::EmptyCoding)?;
        info!(
            "{} heading control assist, coding {current} -> {new_coding}",
            if enable { "Enabling" } else { "Disabling" }
        );
        self.eps_write_coding(&current, &new_coding)?;
        Ok(new_coding)
    }

    /// Unlocks the EPS and writes `requested` in place of `current`.
    ///
    /// Only the heading control assist bit may differ between the two codings, anything else
    /// is refused before security access is attempted
    pub fn eps_write_coding(
        &mut self,
        current: &CodingBlob,
        requested: &CodingBlob,
    ) -> Result<(), WriteError> {
        self.check_extended()?;
        if !current.differs_only_in_assist(requested) {
            error!("Coding {requested} changes more than the assist bit of {current}");
            return Err(WriteError::ForeignCodingChange {
                current: current.clone(),
                requested: requested.clone(),
            });
        }

        let mut stage = SetFeatureStage::SeedRequested;
        let fail = |stage: SetFeatureStage, e: crate::DiagError| {
            let e = WriteError::from_diag(stage, e);
            error!("Coding change stopped while {stage}: {e}");
            e
        };

        let seed = self
            .uds_request_seed(SECURITY_ACCESS_MODE)
            .map_err(|e| fail(stage, e))?;
        let security = SecuritySession::from_seed_bytes(&seed).map_err(|e| fail(stage, e))?;
        debug!("Seed 0x{:08X}, key 0x{:08X}", security.seed, security.key);

        stage = SetFeatureStage::KeySent;
        self.uds_send_key(SECURITY_ACCESS_MODE, &security.key_bytes())
            .map_err(|e| fail(stage, e))?;
        stage = SetFeatureStage::Authenticated;
        if !self.can_write() {
            error!("Key accepted but the session does not permit writing");
            return Err(WriteError::NotAuthenticated);
        }
        debug!("Stage: {stage}");

        stage = SetFeatureStage::WritePending;
        self.uds_write_data_by_identifier(EpsIdentifier::Coding.did(), requested.as_bytes())
            .map_err(|e| fail(stage, e))?;
        stage = SetFeatureStage::Committed;
        info!("Stage: {stage}, EPS accepted coding {requested}");
        Ok(())
    }

    fn check_extended(&self) -> Result<(), WriteError> {
        if self.state() != SessionState::Extended {
            warn!("Coding change requested outside of an extended session");
            return Err(WriteError::SessionNotExtended(self.state()));
        }
        Ok(())
    }

    /// Reads the coding back and checks that it is exactly `expected`
    pub fn eps_verify_coding(&mut self, expected: &CodingBlob) -> Result<(), WriteError> {
        let actual = self
            .eps_read_identifier(EpsIdentifier::Coding)
            .map(|r| CodingBlob::new(r.raw))
            .map_err(WriteError::VerificationRead)?;
        if &actual != expected {
            error!("Coding read back as {actual}, expected {expected}");
            return Err(WriteError::VerificationMismatch {
                expected: expected.clone(),
                actual,
            });
        }
        info!("Coding verified");
        Ok(())
    }
}
