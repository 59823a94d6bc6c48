//! # Device sources.
//!
//! One [`Sampler`](crate::Sampler) per hardware source. Each is wrapped in a
//! [`SamplingWorker`](crate::SamplingWorker) and registered with the hub.
//!
//! | Sampler              | Topic       | I/O                              |
//! |----------------------|-------------|----------------------------------|
//! | [`GpsSampler`]       | `gps`       | AT link, `AT+CGNSSINFO`          |
//! | [`ModemSampler`]     | `modem`     | AT link, CSQ / COPS / CREG / CPSI |
//! | [`ObdSampler`]       | `obd`       | ELM327 link, mode 01 PIDs, mode 03 codes |
//! | [`UpsSampler`]       | `ups`       | sysfs power-supply class         |
//! | [`NetworkSampler`]   | `network`   | sysfs `operstate`                |
//! | [`BluetoothSampler`] | `bluetooth` | `bluetoothctl` via [`CommandRunner`] |
//! | [`SystemSampler`]    | `system`    | `/proc`, thermal zone, `statvfs` |

mod bluetooth;
mod gps;
mod link_slot;
mod modem;
mod network;
mod obd;
mod sysfs;
mod system;
mod ups;

pub use bluetooth::{BluetoothSampler, CommandRunner, SystemRunner};
pub use gps::GpsSampler;
pub use modem::ModemSampler;
pub use network::NetworkSampler;
pub use obd::ObdSampler;
pub use system::SystemSampler;
pub use ups::UpsSampler;
