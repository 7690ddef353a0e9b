//!  Provides methods to manipulate the ECUs diagnostic session mode

use automotive_diag::uds::{UdsCommand, UdsSessionTypeByte};

use crate::{
    DiagError, DiagServerResult,
    session::{DiagSession, SessionType},
};

impl DiagSession {
    /// Requests the ECU to go into a specific diagnostic session mode.
    ///
    /// On a positive response the session state is updated, and any security access
    /// granted in the previous session is forgotten
    pub fn uds_set_session_mode(&mut self, session_mode: SessionType) -> DiagServerResult<()> {
        let mode = u8::from(UdsSessionTypeByte::from(session_mode));
        let res = self.send_command_with_response(UdsCommand::DiagnosticSessionControl, &[mode])?;
        match res.get(1) {
            Some(&echo) if echo == mode => {}
            Some(_) => return Err(DiagError::WrongMessage),
            None => return Err(DiagError::InvalidResponseLength),
        }
        self.set_session_state(session_mode.into());
        Ok(())
    }
}
