//! The hardware module contains simplified API's
//! for interacting with diagnostic adapters that can reach the vehicle bus

pub mod simulation;

#[cfg(all(feature = "socketcan", target_os = "linux"))]
pub mod socketcan;

use crate::channel::IsoTPChannel;

/// Hardware API result
pub type HardwareResult<T> = Result<T, HardwareError>;

/// The hardware trait defines functions supported by all adapters
/// and also functions used to create [super::channel::IsoTPChannel]s on the adapter's buses
pub trait Hardware: Send {
    /// Returns the device info of the adapter
    fn get_info(&self) -> &HardwareInfo;

    /// Puts the adapter into the mode which permits diagnostic traffic towards the vehicle.
    ///
    /// This must be called once, before any channel is created.
    fn enter_diagnostic_mode(&mut self) -> HardwareResult<()>;

    /// Creates an ISO-TP channel on the bus with the given index.
    /// Bus 0 is always the primary bus, bus 1 only exists if
    /// [HardwareCapabilities::secondary_bus] is set.
    fn create_iso_tp_channel(&mut self, bus_index: u8) -> HardwareResult<Box<dyn IsoTPChannel>>;

    /// Returns true if the adapter has a second bus (EG: a multiplexed OBD port connection)
    fn has_secondary_bus(&self) -> bool {
        self.get_info().capabilities.secondary_bus
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Device hardware info
pub struct HardwareInfo {
    /// Name of the hardware
    pub name: String,
    /// Optional vendor of the hardware
    pub vendor: Option<String>,
    /// Listed capabilities of the hardware
    pub capabilities: HardwareCapabilities,
}

/// Contains details about what the physical hardware supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HardwareCapabilities {
    /// Supports ISO-TP
    pub iso_tp: bool,
    /// Has a secondary bus the ECU may be reachable on
    pub secondary_bus: bool,
}

#[derive(Debug, thiserror::Error)]
/// Represents error that can be returned by Hardware API
pub enum HardwareError {
    /// Low level driver error
    #[error("Hardware API Error. Code {code}, Description: {desc}")]
    APIError {
        /// API Error code
        code: u32,
        /// API Error description
        desc: String,
    },
    /// A bus interface exists but its link is down
    #[error("Interface {0} is down")]
    InterfaceDown(String),
    /// The requested bus does not exist on the adapter
    #[error("Bus {0} does not exist on this hardware")]
    BusNotFound(u8),
    /// Hardware not found
    #[error("Device not found")]
    DeviceNotFound,
    /// Function called on device that has not been put into diagnostic mode
    #[error("Hardware device not in diagnostic mode")]
    DeviceNotOpen,
}
