use std::fmt;

use serde::Deserialize;

use crate::store::SpeedUnit;

/// External instruction addressed to one worker.
///
/// Delivered through [`Supervisor::command`](crate::Supervisor::command) and
/// applied at the start of the worker's next loop iteration; the effect shows
/// up as a later record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", content = "value", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// Drop the current device link and rediscover.
    Reconnect,
    /// Force a GPS speed unit, or `Auto` to pick it from the position.
    SetSpeedUnit(SpeedUnit),
    /// Clear stored diagnostic trouble codes.
    ClearDiagnostics,
    /// Switch the radio controller on or off.
    SetPower(bool),
    SetDiscoverable(bool),
}

impl fmt::Display for WorkerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerCommand::Reconnect => f.write_str("reconnect"),
            WorkerCommand::SetSpeedUnit(unit) => write!(f, "set_speed_unit({unit:?})"),
            WorkerCommand::ClearDiagnostics => f.write_str("clear_diagnostics"),
            WorkerCommand::SetPower(on) => write!(f, "set_power({on})"),
            WorkerCommand::SetDiscoverable(on) => write!(f, "set_discoverable({on})"),
        }
    }
}
