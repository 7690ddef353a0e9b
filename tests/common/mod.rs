//! Simulated MQB EPS, answering requests the way the real ECU does
#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use eps_config::{
    channel::IsoTPSettings,
    eps::{compute_key, EpsConfigurator},
    hardware::{simulation::SimulationDevice, simulation::SimulationIsoTpChannel, Hardware},
    session::{DiagSession, TargetDescriptor},
};

pub const SEED: u32 = 0x0000_0010;

#[derive(Debug, Clone)]
pub struct EpsState {
    pub dataset: Vec<u8>,
    pub coding: Vec<u8>,
    /// Active session sub-function, 0 when none
    pub session: u8,
    pub unlocked: bool,
    /// Session control is never answered
    pub silent_session: bool,
    /// Identifiers which are never answered
    pub silent_dids: HashSet<u16>,
    pub reject_key: bool,
    /// The key is never answered
    pub silent_key: bool,
    pub reject_write: bool,
    /// Writes are never answered
    pub silent_write: bool,
    /// Writes get response pending and then nothing
    pub stalled_write: bool,
    /// Writes are acknowledged but not stored
    pub drop_writes: bool,
    /// Writes are answered with response pending first
    pub slow_write: bool,
}

impl Default for EpsState {
    fn default() -> Self {
        Self {
            dataset: b"EV_SteerAssisMQB\0".to_vec(),
            coding: vec![0x08, 0x00, 0x0A],
            session: 0,
            unlocked: false,
            silent_session: false,
            silent_dids: HashSet::new(),
            reject_key: false,
            silent_key: false,
            reject_write: false,
            silent_write: false,
            stalled_write: false,
            drop_writes: false,
            slow_write: false,
        }
    }
}

impl EpsState {
    fn respond(&mut self, req: &[u8]) -> Vec<Vec<u8>> {
        let nrc = |code: u8| vec![vec![0x7F, req[0], code]];
        match req {
            [0x10, mode] => {
                if self.silent_session {
                    return Vec::new();
                }
                self.session = *mode;
                self.unlocked = false;
                vec![vec![0x50, *mode, 0x00, 0x32, 0x01, 0xF4]]
            }
            [0x22, hi, lo] => {
                let did = u16::from_be_bytes([*hi, *lo]);
                if self.silent_dids.contains(&did) {
                    return Vec::new();
                }
                let data: Vec<u8> = match did {
                    0xF191 => b"5Q0909144R".to_vec(),
                    0xF187 => b"5Q0909143P".to_vec(),
                    0xF189 => b"3120".to_vec(),
                    0xF197 => b"EPS_ZFLS Kl. 1".to_vec(),
                    0xF19E => self.dataset.clone(),
                    0xF1A2 => b"001".to_vec(),
                    0x0600 => self.coding.clone(),
                    _ => return nrc(0x31),
                };
                let mut resp = vec![0x62, *hi, *lo];
                resp.extend(data);
                vec![resp]
            }
            [0x27, 0x03] => {
                if self.session != 0x03 {
                    return nrc(0x7F);
                }
                let mut resp = vec![0x67, 0x03];
                resp.extend(SEED.to_be_bytes());
                vec![resp]
            }
            [0x27, 0x04, key @ ..] => {
                if self.silent_key {
                    return Vec::new();
                }
                if self.reject_key || key != compute_key(SEED).to_be_bytes() {
                    return nrc(0x35);
                }
                self.unlocked = true;
                vec![vec![0x67, 0x04]]
            }
            [0x2E, 0x06, 0x00, data @ ..] => {
                if !self.unlocked {
                    return nrc(0x33);
                }
                if self.reject_write {
                    return nrc(0x22);
                }
                if self.silent_write {
                    return Vec::new();
                }
                if self.stalled_write {
                    return nrc(0x78);
                }
                if !self.drop_writes {
                    self.coding = data.to_vec();
                }
                let ok = vec![0x6E, 0x06, 0x00];
                if self.slow_write {
                    vec![vec![0x7F, 0x2E, 0x78], ok]
                } else {
                    vec![ok]
                }
            }
            _ => nrc(0x11),
        }
    }
}

/// Handle on the simulated EPS, shared with the responder installed on the channel
#[derive(Debug, Clone, Default)]
pub struct SimEps {
    state: Arc<Mutex<EpsState>>,
}

impl SimEps {
    pub fn new(state: EpsState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, EpsState> {
        self.state.lock().unwrap()
    }

    pub fn attach(&self, channel: &mut SimulationIsoTpChannel) {
        let state = self.state.clone();
        channel.set_responder(move |req| state.lock().unwrap().respond(req));
    }
}

/// Adapter with the EPS on its secondary bus, like an OBD port behind a gateway
pub struct Bench {
    pub eps: SimEps,
    pub device: SimulationDevice,
    pub bus: SimulationIsoTpChannel,
}

impl Bench {
    pub fn new(state: EpsState) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let eps = SimEps::new(state);
        let mut device = SimulationDevice::new(true);
        device.enter_diagnostic_mode().unwrap();
        let mut bus = device.bus(1).unwrap();
        eps.attach(&mut bus);
        Self { eps, device, bus }
    }

    pub fn target(&self) -> TargetDescriptor {
        TargetDescriptor::for_hardware(&self.device)
    }

    pub fn session(&mut self) -> DiagSession {
        let target = self.target();
        DiagSession::new_over_iso_tp(&mut self.device, target, IsoTPSettings::default()).unwrap()
    }

    pub fn configurator(&mut self) -> EpsConfigurator {
        let target = self.target();
        EpsConfigurator::new(&mut self.device, target, IsoTPSettings::default()).unwrap()
    }

    /// Service ID of every request sent, in order
    pub fn sids(&self) -> Vec<u8> {
        self.bus.sent_requests().iter().map(|r| r[0]).collect()
    }
}
