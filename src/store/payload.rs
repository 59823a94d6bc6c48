//! # Normalized per-topic payloads.
//!
//! Each source decodes into its own struct; [`Payload`] is the closed union of
//! them. Fields that the hardware could not report are `None` and serialize as
//! `null`, which is how viewers learn "unknown" apart from "zero".

use serde::{Deserialize, Serialize};

use super::Topic;

/// One decoded sample of any topic.
///
/// Serialized untagged: the envelope around it already carries the topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Gps(GpsFix),
    Modem(ModemStatus),
    Obd(ObdSnapshot),
    Ups(UpsStatus),
    Network(NetworkStatus),
    Bluetooth(BluetoothStatus),
    System(SystemStatus),
}

impl Payload {
    /// Topic this payload belongs to.
    pub fn topic(&self) -> Topic {
        match self {
            Payload::Gps(_) => Topic::Gps,
            Payload::Modem(_) => Topic::Modem,
            Payload::Obd(_) => Topic::Obd,
            Payload::Ups(_) => Topic::Ups,
            Payload::Network(_) => Topic::Network,
            Payload::Bluetooth(_) => Topic::Bluetooth,
            Payload::System(_) => Topic::System,
        }
    }
}

/// Speed unit for GPS readings.
///
/// `Auto` is only ever a request; a published fix always carries the
/// resolved unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedUnit {
    #[default]
    Auto,
    Kmh,
    Mph,
}

/// Position fix from the GNSS receiver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsFix {
    /// False while the receiver has no position; every other field is then `None`.
    pub fix: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_m: Option<f64>,
    /// Ground speed in `unit`.
    pub speed: Option<f64>,
    pub unit: SpeedUnit,
    pub heading: Option<f64>,
    pub satellites: Option<u32>,
    pub hdop: Option<f64>,
}

impl GpsFix {
    /// A sample taken while the receiver has no fix.
    pub fn no_fix(unit: SpeedUnit) -> Self {
        Self {
            fix: false,
            latitude: None,
            longitude: None,
            altitude_m: None,
            speed: None,
            unit,
            heading: None,
            satellites: None,
            hdop: None,
        }
    }
}

/// Network registration state reported by `AT+CREG?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Registration {
    NotRegistered,
    Home,
    Searching,
    Denied,
    Roaming,
    Unknown,
}

impl Registration {
    /// Maps the numeric `<stat>` field of `+CREG:`.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Registration::NotRegistered,
            1 => Registration::Home,
            2 => Registration::Searching,
            3 => Registration::Denied,
            5 => Registration::Roaming,
            _ => Registration::Unknown,
        }
    }
}

/// Cellular modem status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModemStatus {
    /// Adopted device address.
    pub port: Option<String>,
    pub operator: Option<String>,
    pub registration: Registration,
    /// "2G" .. "5G" when the modem reports its access technology.
    pub network_mode: Option<String>,
    /// Received signal strength; `None` when the modem reports "unknown".
    pub rssi_dbm: Option<i32>,
}

/// Engine readings from the vehicle diagnostic bus.
///
/// A PID the vehicle does not answer (`NO DATA`) reads as `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObdSnapshot {
    pub port: Option<String>,
    pub rpm: Option<f64>,
    pub speed_kmh: Option<u32>,
    pub coolant_c: Option<i32>,
    /// Stored trouble codes such as `P0133`, as of the last mode 03 read.
    pub dtc: Vec<String>,
}

/// Battery backup status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsStatus {
    pub percent: u8,
    pub voltage: Option<f64>,
    pub charging: bool,
    pub on_battery: bool,
    /// Raw power-supply status string ("Charging", "Discharging", ...).
    pub state: String,
}

/// Which interface currently carries traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveInterface {
    Ethernet,
    Wifi,
    None,
}

/// Host network interface state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkStatus {
    pub active: ActiveInterface,
    pub ethernet_up: bool,
    pub wifi_up: bool,
}

/// Short-range radio controller state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BluetoothStatus {
    pub powered: bool,
    pub discoverable: bool,
    pub paired: u32,
    pub connected: u32,
}

/// Used and free space of a memory pool or filesystem, in MiB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpaceUsage {
    pub total_mb: u64,
    pub used_mb: u64,
    pub free_mb: u64,
    /// Used share, 0..=100, one decimal.
    pub percent: f64,
}

impl SpaceUsage {
    pub fn from_total_free(total_mb: u64, free_mb: u64) -> Self {
        let free_mb = free_mb.min(total_mb);
        let used_mb = total_mb - free_mb;
        let percent = if total_mb == 0 {
            0.0
        } else {
            (used_mb as f64 * 1000.0 / total_mb as f64).round() / 10.0
        };
        Self {
            total_mb,
            used_mb,
            free_mb,
            percent,
        }
    }
}

/// Host health of the gateway itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    /// `None` on boards without a thermal zone.
    pub cpu_temp_c: Option<f64>,
    /// One-minute load over the number of cores, in percent.
    pub cpu_load_percent: f64,
    pub load_average: [f64; 3],
    pub memory: SpaceUsage,
    pub disk: SpaceUsage,
    pub uptime_s: u64,
}
