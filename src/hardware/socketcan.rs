//! SocketCAN module
//!
//! Each CAN interface handed to [SocketCanDevice] is one bus. The first interface is bus 0,
//! a second interface (EG: the OBD port side of a gateway) becomes the secondary bus.

use std::{path::Path, time::Instant};

use socketcan_isotp::{
    ExtendedId, FlowControlOptions, Id, IsoTpBehaviour, IsoTpOptions, LinkLayerOptions, StandardId,
};

use crate::channel::{ChannelError, ChannelResult, IsoTPChannel, IsoTPSettings, PayloadChannel};

use super::{Hardware, HardwareCapabilities, HardwareError, HardwareInfo, HardwareResult};

const SYSFS_NET: &str = "/sys/class/net";

/// Fails if the kernel reports the interface link as down. Virtual CAN interfaces
/// report `unknown`, which is accepted
fn check_link(sysfs_net: &Path, if_name: &str) -> HardwareResult<()> {
    let path = sysfs_net.join(if_name).join("operstate");
    let state = std::fs::read_to_string(path).map_err(|e| HardwareError::APIError {
        code: e.raw_os_error().unwrap_or_default() as u32,
        desc: format!("cannot read state of {if_name}: {e}"),
    })?;
    if state.trim() == "down" {
        log::error!("CAN interface {if_name} is down");
        return Err(HardwareError::InterfaceDown(if_name.to_string()));
    }
    Ok(())
}

/// SocketCAN device
#[derive(Clone, Debug)]
pub struct SocketCanDevice {
    info: HardwareInfo,
    interfaces: Vec<String>,
    diag_mode: bool,
}

impl SocketCanDevice {
    /// Opens a SocketCAN device made up of the given interfaces, in bus order
    pub fn open(interfaces: &[String]) -> HardwareResult<Self> {
        if interfaces.is_empty() {
            return Err(HardwareError::DeviceNotFound);
        }
        if let Some(missing) = interfaces
            .iter()
            .find(|name| !Path::new(SYSFS_NET).join(name).exists())
        {
            log::error!("CAN interface {missing} does not exist");
            return Err(HardwareError::DeviceNotFound);
        }
        Ok(Self {
            info: HardwareInfo {
                name: interfaces.join(","),
                vendor: None,
                capabilities: HardwareCapabilities {
                    iso_tp: true,
                    secondary_bus: interfaces.len() > 1,
                },
            },
            interfaces: interfaces.to_vec(),
            diag_mode: false,
        })
    }
}

impl Hardware for SocketCanDevice {
    fn get_info(&self) -> &HardwareInfo {
        &self.info
    }

    /// SocketCAN has no adapter mode to select. Only checks that no interface link is down
    fn enter_diagnostic_mode(&mut self) -> HardwareResult<()> {
        for if_name in &self.interfaces {
            check_link(Path::new(SYSFS_NET), if_name)?;
        }
        log::debug!("SocketCAN device {} ready for diagnostic traffic", self.info.name);
        self.diag_mode = true;
        Ok(())
    }

    fn create_iso_tp_channel(&mut self, bus_index: u8) -> HardwareResult<Box<dyn IsoTPChannel>> {
        if !self.diag_mode {
            return Err(HardwareError::DeviceNotOpen);
        }
        let if_name = self
            .interfaces
            .get(bus_index as usize)
            .ok_or(HardwareError::BusNotFound(bus_index))?;
        Ok(Box::new(SocketCanIsoTPChannel {
            if_name: if_name.clone(),
            channel: None,
            ids: (0, 0),
            cfg: IsoTPSettings::default(),
        }))
    }
}

/// SocketCAN ISO-TP channel
pub struct SocketCanIsoTPChannel {
    if_name: String,
    channel: Option<socketcan_isotp::IsoTpSocket>,
    /// Tx ID, Rx ID
    ids: (u32, u32),
    cfg: IsoTPSettings,
}

impl SocketCanIsoTPChannel {
    fn safe_with_iface<X, T: FnOnce(&mut socketcan_isotp::IsoTpSocket) -> ChannelResult<X>>(
        &mut self,
        function: T,
    ) -> ChannelResult<X> {
        match self.channel.as_mut() {
            Some(channel) => function(channel),
            None => Err(ChannelError::InterfaceNotOpen),
        }
    }

    fn can_id(&self, id: u32) -> ChannelResult<Id> {
        let id = if self.cfg.can_use_ext_addr {
            ExtendedId::new(id).map(Id::Extended)
        } else {
            u16::try_from(id)
                .ok()
                .and_then(StandardId::new)
                .map(Id::Standard)
        };
        id.ok_or(ChannelError::UnsupportedRequest)
    }
}

impl std::fmt::Debug for SocketCanIsoTPChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketCanIsoTPChannel")
            .field("if_name", &self.if_name)
            .field("ids", &self.ids)
            .finish()
    }
}

impl PayloadChannel for SocketCanIsoTPChannel {
    fn open(&mut self) -> ChannelResult<()> {
        if self.channel.is_some() {
            // Already open
            return Ok(());
        }
        let mut flags: IsoTpBehaviour = IsoTpBehaviour::empty();
        if self.cfg.pad_frame {
            flags |= IsoTpBehaviour::CAN_ISOTP_TX_PADDING
        }

        let opts = IsoTpOptions::new(
            flags,
            std::time::Duration::from_millis(0),
            0,
            0xCC,
            0xCC,
            0,
        )
        .map_err(|e| ChannelError::APIError {
            api_name: "socketCAN".into(),
            code: 99,
            desc: e.to_string(),
        })?;

        let tx_id = self.can_id(self.ids.0)?;
        let rx_id = self.can_id(self.ids.1)?;
        let fc_opts = FlowControlOptions::new(self.cfg.block_size, self.cfg.st_min, 0);

        let socket = socketcan_isotp::IsoTpSocket::open_with_opts(
            &self.if_name,
            rx_id,
            tx_id,
            Some(opts),
            Some(fc_opts),
            Some(LinkLayerOptions::default()),
        )?;
        socket.set_nonblocking(true)?;
        self.channel = Some(socket);
        log::debug!(
            "ISO-TP channel open on {} (Tx 0x{:03X}, Rx 0x{:03X})",
            self.if_name,
            self.ids.0,
            self.ids.1
        );
        Ok(())
    }

    fn close(&mut self) -> ChannelResult<()> {
        self.channel = None; // Closes channel
        Ok(())
    }

    fn set_ids(&mut self, send: u32, recv: u32) -> ChannelResult<()> {
        self.ids = (send, recv);
        Ok(())
    }

    fn read_bytes(&mut self, timeout_ms: u32) -> ChannelResult<Vec<u8>> {
        let start = Instant::now();
        let timeout = std::cmp::max(1, timeout_ms);
        self.safe_with_iface(|socket| {
            while start.elapsed().as_millis() <= timeout as u128 {
                if let Ok(data) = socket.read() {
                    return Ok(data.to_vec());
                }
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
            if timeout_ms == 0 {
                Err(ChannelError::BufferEmpty)
            } else {
                Err(ChannelError::ReadTimeout)
            }
        })
    }

    /// Writes bytes to the socketcan socket.
    ///
    /// The socket is bound to the Tx ID given to [PayloadChannel::set_ids], so writing to any
    /// other address fails with [ChannelError::UnsupportedRequest]
    fn write_bytes(&mut self, addr: u32, buffer: &[u8], _timeout_ms: u32) -> ChannelResult<()> {
        if addr != self.ids.0 {
            return Err(ChannelError::UnsupportedRequest);
        }
        self.safe_with_iface(|socket| {
            socket.write(buffer)?;
            Ok(())
        })
    }

    fn clear_rx_buffer(&mut self) -> ChannelResult<()> {
        self.safe_with_iface(|socket| {
            while socket.read().is_ok() {}
            Ok(())
        })
    }

    fn clear_tx_buffer(&mut self) -> ChannelResult<()> {
        Ok(())
    }
}

impl IsoTPChannel for SocketCanIsoTPChannel {
    fn set_iso_tp_cfg(&mut self, cfg: IsoTPSettings) -> ChannelResult<()> {
        self.cfg = cfg;
        Ok(())
    }
}

impl Drop for SocketCanIsoTPChannel {
    #[allow(unused_must_use)]
    fn drop(&mut self) {
        self.close();
    }
}

impl From<socketcan_isotp::Error> for ChannelError {
    fn from(e: socketcan_isotp::Error) -> Self {
        Self::APIError {
            api_name: "socketCAN".into(),
            code: 99,
            desc: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn fake_sysfs(test: &str, states: &[(&str, &str)]) -> PathBuf {
        let root = std::env::temp_dir().join(format!("eps_config_{test}_{}", std::process::id()));
        for (if_name, state) in states {
            std::fs::create_dir_all(root.join(if_name)).unwrap();
            std::fs::write(root.join(if_name).join("operstate"), format!("{state}\n")).unwrap();
        }
        root
    }

    #[test]
    fn link_state_checked() {
        let root = fake_sysfs("link", &[("can0", "up"), ("vcan0", "unknown"), ("can1", "down")]);
        assert!(check_link(&root, "can0").is_ok());
        assert!(check_link(&root, "vcan0").is_ok());
        assert!(matches!(
            check_link(&root, "can1"),
            Err(HardwareError::InterfaceDown(name)) if name == "can1"
        ));
        assert!(matches!(
            check_link(&root, "can9"),
            Err(HardwareError::APIError { .. })
        ));
        std::fs::remove_dir_all(root).unwrap();
    }
}
