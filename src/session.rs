//! Diagnostic session context
//!
//! [DiagSession] owns the ISO-TP channel to one ECU for the duration of a workflow. Requests are
//! strictly sequential: one request is written, then exactly one response (or a timeout) is
//! awaited before anything else can be sent. There are no background threads and no
//! automatic retries.

use std::time::{Duration, Instant};

use automotive_diag::uds::{UdsError, UdsErrorByte, UdsSessionType, UdsSessionTypeByte};
use log::{debug, error, info, warn};

use crate::{
    channel::{IsoTPChannel, IsoTPSettings},
    hardware::Hardware,
    uds::lookup_uds_nrc,
    DiagError, DiagServerResult, Standard,
};

/// Negative response service ID
const NEGATIVE_RESPONSE_SID: u8 = 0x7F;

/// Identifies which ECU to talk to, and how
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetDescriptor {
    /// CAN ID the ECU listens for requests on
    pub request_address: u32,
    /// CAN ID the ECU responds on
    pub response_address: u32,
    /// Bus of the adapter the ECU is reachable on
    pub bus_index: u8,
    /// Timeout applied to every request, in milliseconds
    pub timeout_ms: u32,
    /// How long to keep waiting once the ECU has replied with ResponsePending, in milliseconds
    pub response_pending_timeout_ms: u32,
}

impl Default for TargetDescriptor {
    /// The EPS of MQB platform vehicles
    fn default() -> Self {
        Self {
            request_address: 0x712,
            response_address: 0x77C,
            bus_index: 0,
            timeout_ms: 200,
            response_pending_timeout_ms: 5000,
        }
    }
}

impl TargetDescriptor {
    /// Default target, on the secondary bus if the adapter has one
    pub fn for_hardware<H: Hardware + ?Sized>(hw: &H) -> Self {
        Self {
            bus_index: if hw.has_secondary_bus() { 1 } else { 0 },
            ..Self::default()
        }
    }
}

/// Diagnostic session a caller can ask for
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionType {
    /// Default session. Enough for reading identification
    #[strum(to_string = "default")]
    Default,
    /// Extended session. Required for security access and writes
    #[strum(to_string = "extended")]
    Extended,
}

impl From<SessionType> for UdsSessionTypeByte {
    fn from(s: SessionType) -> Self {
        match s {
            SessionType::Default => Standard(UdsSessionType::Default),
            SessionType::Extended => Standard(UdsSessionType::Extended),
        }
    }
}

/// Diagnostic session currently active on the ECU, as far as this client knows
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, strum_macros::Display)]
pub enum SessionState {
    /// No session, or the ECU stopped answering
    #[default]
    Closed,
    /// Default session
    Default,
    /// Extended session
    Extended,
}

impl From<SessionType> for SessionState {
    fn from(s: SessionType) -> Self {
        match s {
            SessionType::Default => SessionState::Default,
            SessionType::Extended => SessionState::Extended,
        }
    }
}

/// Session control error
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The ECU did not answer the session control request
    #[error("Timeout opening {0} session with the ECU")]
    Timeout(SessionType),
    /// Session control failed for a reason other than a timeout
    #[error("Failed to open {session} session with the ECU")]
    Failed {
        /// Requested session
        session: SessionType,
        /// Underlying error
        #[source]
        source: DiagError,
    },
}

/// Diagnostic session with a single ECU
pub struct DiagSession {
    channel: Box<dyn IsoTPChannel>,
    target: TargetDescriptor,
    state: SessionState,
    security_unlocked: bool,
}

impl std::fmt::Debug for DiagSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagSession")
            .field("target", &self.target)
            .field("state", &self.state)
            .field("security_unlocked", &self.security_unlocked)
            .finish()
    }
}

impl DiagSession {
    /// Creates a new session over an ISO-TP channel on the target's bus.
    ///
    /// The hardware must already be in diagnostic mode, see [Hardware::enter_diagnostic_mode].
    /// No traffic is sent until a request is made. The session starts [SessionState::Closed]
    pub fn new_over_iso_tp<H: Hardware + ?Sized>(
        hw: &mut H,
        target: TargetDescriptor,
        channel_cfg: IsoTPSettings,
    ) -> DiagServerResult<Self> {
        let channel = hw.create_iso_tp_channel(target.bus_index)?;
        Self::from_channel(channel, target, channel_cfg)
    }

    /// Creates a new session over an already created ISO-TP channel
    pub fn from_channel(
        mut channel: Box<dyn IsoTPChannel>,
        target: TargetDescriptor,
        channel_cfg: IsoTPSettings,
    ) -> DiagServerResult<Self> {
        channel.set_iso_tp_cfg(channel_cfg)?;
        channel.set_ids(target.request_address, target.response_address)?;
        channel.open()?;
        Ok(Self {
            channel,
            target,
            state: SessionState::Closed,
            security_unlocked: false,
        })
    }

    /// Opens the given diagnostic session on the ECU.
    ///
    /// On timeout the state is left [SessionState::Closed] and the caller should abort.
    /// Any positive response is accepted
    pub fn open(&mut self, session: SessionType) -> Result<(), SessionError> {
        match self.uds_set_session_mode(session) {
            Ok(()) => Ok(()),
            Err(e) if e.is_timeout() => {
                error!("Timeout opening {session} session");
                Err(SessionError::Timeout(session))
            }
            Err(source) => Err(SessionError::Failed { session, source }),
        }
    }

    /// Target this session is talking to
    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    /// Current diagnostic session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true if the ECU accepted a key in the current session
    pub fn is_security_unlocked(&self) -> bool {
        self.security_unlocked
    }

    /// Returns true if the ECU will accept write class requests: an extended session is active
    /// and security access was granted within it
    pub fn can_write(&self) -> bool {
        self.state == SessionState::Extended && self.security_unlocked
    }

    pub(crate) fn set_session_state(&mut self, state: SessionState) {
        if self.state != state {
            info!("Diagnostic session {} -> {}", self.state, state);
        }
        self.state = state;
        // A session change always relocks the ECU
        self.security_unlocked = false;
    }

    pub(crate) fn set_security_unlocked(&mut self) {
        info!("Security access granted");
        self.security_unlocked = true;
    }

    fn drop_session(&mut self) {
        if self.state != SessionState::Closed {
            warn!("ECU stopped responding, assuming the session is lost");
        }
        self.state = SessionState::Closed;
        self.security_unlocked = false;
    }

    /// Send a command to the ECU and await its response.
    ///
    /// ## Returns
    /// The full positive response, which begins with the service ID + 0x40
    pub fn send_command_with_response<T: Into<u8>>(
        &mut self,
        cmd: T,
        args: &[u8],
    ) -> DiagServerResult<Vec<u8>> {
        let mut r = vec![cmd.into()];
        r.extend_from_slice(args);
        self.send_byte_array_with_response(&r)
    }

    /// Send a raw request to the ECU and await its response
    pub fn send_byte_array_with_response(&mut self, p: &[u8]) -> DiagServerResult<Vec<u8>> {
        let sid = *p.first().ok_or(DiagError::ParameterInvalid)?;
        match self.perform(sid, p) {
            Err(DiagError::Timeout) => {
                error!("ECU did not respond to {p:02X?}");
                self.drop_session();
                Err(DiagError::Timeout)
            }
            res => res,
        }
    }

    fn perform(&mut self, sid: u8, payload: &[u8]) -> DiagServerResult<Vec<u8>> {
        self.channel.clear_rx_buffer()?;
        self.channel.clear_tx_buffer()?;
        debug!("Sending req to ECU: {payload:02X?}");
        let mut res = self.channel.read_write_bytes(
            self.target.request_address,
            payload,
            self.target.timeout_ms,
            self.target.timeout_ms,
        )?;
        let mut pending_since: Option<Instant> = None;
        loop {
            debug!("ECU Response: {res:02X?}");
            if res.is_empty() {
                return Err(DiagError::EmptyResponse);
            }
            if res[0] != NEGATIVE_RESPONSE_SID {
                return check_pos_response_id(sid, res);
            }
            if res.len() < 3 {
                return Err(DiagError::InvalidResponseLength);
            }
            if res[1] != sid {
                error!("Negative response is for SID 0x{:02X}, request was 0x{sid:02X}", res[1]);
                return Err(DiagError::WrongMessage);
            }
            let nrc = UdsErrorByte::from(res[2]);
            if !matches!(nrc, Standard(UdsError::RequestCorrectlyReceivedResponsePending)) {
                warn!("ECU Negative response 0x{:02X} ({})", res[2], lookup_uds_nrc(res[2]));
                return Err(DiagError::ECUError {
                    code: res[2],
                    def: Some(lookup_uds_nrc(res[2])),
                });
            }
            // The ECU accepted the request but needs longer. Keep reading without resending
            let window = Duration::from_millis(self.target.response_pending_timeout_ms as u64);
            let started = *pending_since.get_or_insert_with(Instant::now);
            let remaining = window.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(DiagError::Timeout);
            }
            warn!("ECU Responded with response pending, waiting for real response");
            res = self.channel.read_bytes(remaining.as_millis() as u32)?;
        }
    }
}

impl Drop for DiagSession {
    fn drop(&mut self) {
        if let Err(e) = self.channel.close() {
            warn!("Error closing ISO-TP channel: {e}")
        }
    }
}

/// Checks if the response payload matches the request ServiceID.
/// For UDS, the matching response SID is request + 0x40.
fn check_pos_response_id(sid: u8, resp: Vec<u8>) -> DiagServerResult<Vec<u8>> {
    if resp[0] != sid.wrapping_add(0x40) {
        error!(
            "ECU SID mismatch. Request SID was 0x{sid:02X}, response SID was 0x{:02X}",
            resp[0]
        );
        Err(DiagError::WrongMessage)
    } else {
        Ok(resp)
    }
}
