//! Read and write data by identifier (0x22 / 0x2E)

use automotive_diag::uds::UdsCommand;

use crate::{session::DiagSession, DiagError, DiagServerResult};

impl DiagSession {
    /// Reads a data record from the ECU using a 16 bit identifier
    ///
    /// ## Returns
    /// The record payload, without the SID and identifier echo
    pub fn uds_read_data_by_identifier(&mut self, identifier: u16) -> DiagServerResult<Vec<u8>> {
        let mut resp = self.send_command_with_response(
            UdsCommand::ReadDataByIdentifier,
            &identifier.to_be_bytes(),
        )?;
        check_identifier_echo(&resp, identifier)?;
        resp.drain(0..3);
        Ok(resp)
    }

    /// Overwrites a data record on the ECU.
    ///
    /// Most records are protected, and require an extended session with security access
    /// granted before the ECU accepts the write
    pub fn uds_write_data_by_identifier(
        &mut self,
        identifier: u16,
        data: &[u8],
    ) -> DiagServerResult<()> {
        if data.is_empty() {
            return Err(DiagError::ParameterInvalid);
        }
        let mut args = Vec::with_capacity(data.len() + 2);
        args.extend_from_slice(&identifier.to_be_bytes());
        args.extend_from_slice(data);
        let resp = self.send_command_with_response(UdsCommand::WriteDataByIdentifier, &args)?;
        check_identifier_echo(&resp, identifier)
    }
}

fn check_identifier_echo(resp: &[u8], want: u16) -> DiagServerResult<()> {
    if resp.len() < 3 {
        return Err(DiagError::InvalidResponseLength);
    }
    let received = u16::from_be_bytes([resp[1], resp[2]]);
    if received != want {
        log::error!("Requested ident 0x{want:04X} but ECU replied for 0x{received:04X}");
        return Err(DiagError::MismatchedIdentResponse { want, received });
    }
    Ok(())
}
