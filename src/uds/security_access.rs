//! Provides methods for security seed/key access to the ECU in order to unlock functions which
//! are considered secure such as writing coding data
//!
//! Seed requests use odd access modes, and the key for that seed is sent on the next even mode

use automotive_diag::uds::UdsCommand;

use crate::{session::DiagSession, DiagError, DiagServerResult};

impl DiagSession {
    /// Requests a seed from the ECU for security access.
    ///
    /// Once the key is calculated from the response seed, run [DiagSession::uds_send_key] to
    /// send the computed key to the ECU
    ///
    /// ## Parameters
    /// * access_mode - The access mode. Only odd numbers between 0x01-0x7F are valid
    ///
    /// ## Returns
    /// Returns the security key's seed
    pub fn uds_request_seed(&mut self, access_mode: u8) -> DiagServerResult<Vec<u8>> {
        if access_mode % 2 == 0 || access_mode > 0x7F {
            return Err(DiagError::ParameterInvalid);
        }
        let mut resp =
            self.send_command_with_response(UdsCommand::SecurityAccess, &[access_mode])?;
        check_access_mode_echo(&resp, access_mode)?;
        resp.drain(0..2); // Remove SID and access mode, so just seed value left
        Ok(resp)
    }

    /// Sends the computed key to the ECU.
    ///
    /// If this function is successful, then the ECU now allows access to security protected
    /// functions for the remainder of the current diagnostic session
    ///
    /// ## Parameters
    /// * access_mode - The SAME access mode as given to [DiagSession::uds_request_seed]. The key
    ///   is sent with access mode + 1
    /// * key - The computed key to send to the ECU
    pub fn uds_send_key(&mut self, access_mode: u8, key: &[u8]) -> DiagServerResult<()> {
        if access_mode % 2 == 0 || access_mode > 0x7F {
            return Err(DiagError::ParameterInvalid);
        }
        let mut payload = Vec::with_capacity(key.len() + 1);
        payload.push(access_mode + 1);
        payload.extend_from_slice(key);
        let resp = self.send_command_with_response(UdsCommand::SecurityAccess, &payload)?;
        check_access_mode_echo(&resp, access_mode + 1)?;
        self.set_security_unlocked();
        Ok(())
    }
}

fn check_access_mode_echo(resp: &[u8], access_mode: u8) -> DiagServerResult<()> {
    match resp.get(1) {
        Some(&echo) if echo == access_mode => Ok(()),
        Some(_) => Err(DiagError::WrongMessage),
        None => Err(DiagError::InvalidResponseLength),
    }
}
