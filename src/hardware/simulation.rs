//! Simulation hardware for unit testing diagnostic sessions
//!
//! [SimulationIsoTpChannel] answers requests from a scripted table, or from a responder
//! closure for stateful ECU doubles. A request with no scripted answer is never answered,
//! which the session sees as a timeout. Every request written is logged so tests can prove
//! that a request was, or was not, sent.

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::channel::{ChannelError, ChannelResult, IsoTPChannel, IsoTPSettings, PayloadChannel};

use super::{Hardware, HardwareCapabilities, HardwareError, HardwareInfo, HardwareResult};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

#[derive(Default)]
struct SimState {
    /// Request -> queue of exchanges. Each exchange is the list of payloads the ECU replies with.
    /// The last exchange in a queue is sticky and answers every later identical request.
    scripted: HashMap<Vec<u8>, VecDeque<Vec<Vec<u8>>>>,
    responder: Option<Responder>,
    rx_queue: VecDeque<Vec<u8>>,
    tx_log: Vec<(u32, Vec<u8>)>,
    ids: (u32, u32),
    cfg: Option<IsoTPSettings>,
    open: bool,
}

/// In memory ISO-TP channel. Clones share the same state, so a test can keep a handle
/// while the session owns another.
#[derive(Clone, Default)]
pub struct SimulationIsoTpChannel {
    state: Arc<Mutex<SimState>>,
}

impl fmt::Debug for SimulationIsoTpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("SimulationIsoTpChannel")
            .field("ids", &state.ids)
            .field("open", &state.open)
            .field("requests_sent", &state.tx_log.len())
            .finish()
    }
}

impl SimulationIsoTpChannel {
    /// Creates a simulated channel with nothing scripted. Every request will time out
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Scripts a single response payload for a request
    pub fn add_response(&mut self, req: &[u8], resp: &[u8]) {
        self.add_exchange(req, &[resp]);
    }

    /// Scripts an exchange where the ECU sends several payloads for one request,
    /// EG: a response pending NRC followed by the real response
    pub fn add_exchange(&mut self, req: &[u8], resps: &[&[u8]]) {
        self.lock()
            .scripted
            .entry(req.to_vec())
            .or_default()
            .push_back(resps.iter().map(|r| r.to_vec()).collect());
    }

    /// Installs a closure which computes the ECU's replies for any request that has nothing scripted.
    /// Returning an empty list means the ECU stays silent
    pub fn set_responder<F>(&mut self, responder: F)
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        self.lock().responder = Some(Box::new(responder));
    }

    /// Removes every scripted response and the responder
    pub fn clear_map(&mut self) {
        let mut state = self.lock();
        state.scripted.clear();
        state.responder = None;
        state.rx_queue.clear();
    }

    /// Every request payload written to the channel, in order
    pub fn sent_requests(&self) -> Vec<Vec<u8>> {
        self.lock().tx_log.iter().map(|(_, p)| p.clone()).collect()
    }

    /// Every request written to the channel, with the address it was sent to
    pub fn sent_requests_with_addr(&self) -> Vec<(u32, Vec<u8>)> {
        self.lock().tx_log.clone()
    }

    /// Returns true if any request starting with the given service ID was written
    pub fn was_service_sent(&self, sid: u8) -> bool {
        self.lock().tx_log.iter().any(|(_, p)| p.first() == Some(&sid))
    }

    /// The (send, receive) IDs configured on the channel
    pub fn ids(&self) -> (u32, u32) {
        self.lock().ids
    }

    /// The ISO-TP settings applied to the channel, if any
    pub fn iso_tp_cfg(&self) -> Option<IsoTPSettings> {
        self.lock().cfg
    }

    /// Returns true if the channel is currently open
    pub fn is_open(&self) -> bool {
        self.lock().open
    }
}

impl PayloadChannel for SimulationIsoTpChannel {
    fn open(&mut self) -> ChannelResult<()> {
        self.lock().open = true;
        Ok(())
    }

    fn close(&mut self) -> ChannelResult<()> {
        self.lock().open = false;
        Ok(())
    }

    fn set_ids(&mut self, send: u32, recv: u32) -> ChannelResult<()> {
        self.lock().ids = (send, recv);
        Ok(())
    }

    fn read_bytes(&mut self, _timeout_ms: u32) -> ChannelResult<Vec<u8>> {
        let mut state = self.lock();
        if !state.open {
            return Err(ChannelError::InterfaceNotOpen);
        }
        state.rx_queue.pop_front().ok_or(ChannelError::ReadTimeout)
    }

    fn write_bytes(&mut self, addr: u32, buffer: &[u8], _timeout_ms: u32) -> ChannelResult<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.open {
            return Err(ChannelError::InterfaceNotOpen);
        }
        state.tx_log.push((addr, buffer.to_vec()));
        let replies = match state.scripted.get_mut(buffer) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => match state.responder.as_mut() {
                Some(responder) => responder(buffer),
                None => Vec::new(),
            },
        };
        state.rx_queue.extend(replies);
        Ok(())
    }

    fn clear_rx_buffer(&mut self) -> ChannelResult<()> {
        self.lock().rx_queue.clear();
        Ok(())
    }

    fn clear_tx_buffer(&mut self) -> ChannelResult<()> {
        Ok(())
    }
}

impl IsoTPChannel for SimulationIsoTpChannel {
    fn set_iso_tp_cfg(&mut self, cfg: IsoTPSettings) -> ChannelResult<()> {
        self.lock().cfg = Some(cfg);
        Ok(())
    }
}

/// Simulated diagnostic adapter, owning one [SimulationIsoTpChannel] per bus
#[derive(Debug, Clone)]
pub struct SimulationDevice {
    info: HardwareInfo,
    buses: Vec<SimulationIsoTpChannel>,
    diag_mode: bool,
}

impl SimulationDevice {
    /// Creates a simulated adapter. If `secondary_bus` is set, the adapter exposes two buses
    pub fn new(secondary_bus: bool) -> Self {
        let bus_count = if secondary_bus { 2 } else { 1 };
        Self {
            info: HardwareInfo {
                name: "Simulation".into(),
                vendor: None,
                capabilities: HardwareCapabilities {
                    iso_tp: true,
                    secondary_bus,
                },
            },
            buses: (0..bus_count).map(|_| SimulationIsoTpChannel::new()).collect(),
            diag_mode: false,
        }
    }

    /// Returns a handle to the simulated channel on a bus, for scripting and inspection
    pub fn bus(&self, bus_index: u8) -> Option<SimulationIsoTpChannel> {
        self.buses.get(bus_index as usize).cloned()
    }

    /// Returns true once [Hardware::enter_diagnostic_mode] has been called
    pub fn in_diagnostic_mode(&self) -> bool {
        self.diag_mode
    }
}

impl Hardware for SimulationDevice {
    fn get_info(&self) -> &HardwareInfo {
        &self.info
    }

    fn enter_diagnostic_mode(&mut self) -> HardwareResult<()> {
        self.diag_mode = true;
        Ok(())
    }

    fn create_iso_tp_channel(&mut self, bus_index: u8) -> HardwareResult<Box<dyn IsoTPChannel>> {
        if !self.diag_mode {
            return Err(HardwareError::DeviceNotOpen);
        }
        match self.buses.get(bus_index as usize) {
            Some(channel) => Ok(Box::new(channel.clone())),
            None => Err(HardwareError::BusNotFound(bus_index)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unscripted_request_times_out() {
        let mut channel = SimulationIsoTpChannel::new();
        channel.open().unwrap();
        channel.write_bytes(0x712, &[0x22, 0xF1, 0x87], 100).unwrap();
        assert!(matches!(channel.read_bytes(100), Err(ChannelError::ReadTimeout)));
        assert_eq!(channel.sent_requests(), vec![vec![0x22, 0xF1, 0x87]]);
    }

    #[test]
    fn last_scripted_exchange_is_sticky() {
        let mut channel = SimulationIsoTpChannel::new();
        channel.add_response(&[0x22, 0x06, 0x00], &[0x62, 0x06, 0x00, 0x01]);
        channel.add_response(&[0x22, 0x06, 0x00], &[0x62, 0x06, 0x00, 0x11]);
        channel.open().unwrap();
        for expected in [0x01, 0x11, 0x11] {
            let resp = channel
                .read_write_bytes(0x712, &[0x22, 0x06, 0x00], 100, 100)
                .unwrap();
            assert_eq!(resp[3], expected);
        }
    }

    #[test]
    fn device_requires_diagnostic_mode() {
        let mut dev = SimulationDevice::new(false);
        assert!(matches!(
            dev.create_iso_tp_channel(0),
            Err(HardwareError::DeviceNotOpen)
        ));
        dev.enter_diagnostic_mode().unwrap();
        assert!(dev.create_iso_tp_channel(0).is_ok());
        assert!(matches!(
            dev.create_iso_tp_channel(1),
            Err(HardwareError::BusNotFound(1))
        ));
        assert!(!dev.has_secondary_bus());
    }
}
