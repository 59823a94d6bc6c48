//! Short-range radio controller through `bluetoothctl`.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time;
use tracing::info;

use crate::error::{LinkError, SampleError};
use crate::store::{BluetoothStatus, Payload, Topic};
use crate::workers::{Sampler, WorkerCommand};

const PROGRAM: &str = "bluetoothctl";

/// Runs one external command and returns its standard output.
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    async fn run(&self, program: &str, args: &[&str]) -> Result<String, LinkError>;
}

/// [`CommandRunner`] that spawns real processes, killed after `timeout`.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<String, LinkError> {
        let command = format!("{program} {}", args.join(" "));
        let mut child = Command::new(program);
        child
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = time::timeout(self.timeout, child.output())
            .await
            .map_err(|_| LinkError::Timeout {
                command: command.clone(),
                after: self.timeout,
            })?
            .map_err(|e| LinkError::Unavailable {
                address: program.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(LinkError::Rejected {
                command,
                reply: vec![output.status.to_string()],
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Samples controller power, discoverability and device counts.
pub struct BluetoothSampler {
    runner: Arc<dyn CommandRunner>,
}

impl BluetoothSampler {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Uses `bluetoothctl` from `PATH`.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemRunner::default()))
    }

    async fn ctl(&self, args: &[&str]) -> Result<String, SampleError> {
        Ok(self.runner.run(PROGRAM, args).await?)
    }

    async fn toggle(&self, what: &str, on: bool) -> Result<(), SampleError> {
        let state = if on { "on" } else { "off" };
        self.ctl(&[what, state]).await?;
        info!(setting = what, state, "bluetooth controller updated");
        Ok(())
    }
}

#[async_trait]
impl Sampler for BluetoothSampler {
    fn topic(&self) -> Topic {
        Topic::Bluetooth
    }

    async fn sample(&mut self) -> Result<Payload, SampleError> {
        let show = self.ctl(&["show"]).await?;
        let powered = show_flag(&show, "Powered")?;
        let discoverable = show_flag(&show, "Discoverable")?;
        let paired = count_devices(&self.ctl(&["devices", "Paired"]).await?);
        let connected = count_devices(&self.ctl(&["devices", "Connected"]).await?);

        Ok(Payload::Bluetooth(BluetoothStatus {
            powered,
            discoverable,
            paired,
            connected,
        }))
    }

    async fn apply(&mut self, command: &WorkerCommand) -> Result<(), SampleError> {
        match command {
            WorkerCommand::SetPower(on) => self.toggle("power", *on).await,
            WorkerCommand::SetDiscoverable(on) => self.toggle("discoverable", *on).await,
            other => Err(SampleError::Unsupported(other.to_string())),
        }
    }
}

/// Reads a `Key: yes|no` line of `bluetoothctl show`.
fn show_flag(show: &str, key: &str) -> Result<bool, SampleError> {
    let value = show
        .lines()
        .find_map(|l| l.trim().strip_prefix(key)?.strip_prefix(':'))
        .map(str::trim)
        .ok_or_else(|| SampleError::decode(format!("controller did not report {key}")))?;
    match value {
        "yes" => Ok(true),
        "no" => Ok(false),
        other => Err(SampleError::decode(format!("bad {key} value {other:?}"))),
    }
}

fn count_devices(listing: &str) -> u32 {
    listing
        .lines()
        .filter(|l| l.trim_start().starts_with("Device "))
        .count() as u32
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    const SHOW: &str = "Controller B8:27:EB:00:11:22 (public)\n\
        \tName: gateway\n\
        \tPowered: yes\n\
        \tDiscoverable: no\n\
        \tPairable: yes\n";

    #[derive(Default)]
    struct FakeRunner {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, program: &str, args: &[&str]) -> Result<String, LinkError> {
            let line = args.join(" ");
            self.calls.lock().unwrap().push(line.clone());
            assert_eq!(program, PROGRAM);
            Ok(match line.as_str() {
                "show" => SHOW.to_string(),
                "devices Paired" => "Device AA:BB:CC:DD:EE:01 Phone\nDevice AA:BB:CC:DD:EE:02 Headset\n".into(),
                "devices Connected" => "Device AA:BB:CC:DD:EE:02 Headset\n".into(),
                _ => String::new(),
            })
        }
    }

    #[tokio::test]
    async fn samples_controller_state() {
        let mut bt = BluetoothSampler::new(Arc::new(FakeRunner::default()));
        let Payload::Bluetooth(status) = bt.sample().await.unwrap() else {
            panic!("expected a bluetooth payload");
        };
        assert_eq!(
            status,
            BluetoothStatus {
                powered: true,
                discoverable: false,
                paired: 2,
                connected: 1,
            }
        );
    }

    #[tokio::test]
    async fn commands_map_to_bluetoothctl() {
        let runner = Arc::new(FakeRunner::default());
        let mut bt = BluetoothSampler::new(runner.clone());
        bt.apply(&WorkerCommand::SetPower(false)).await.unwrap();
        bt.apply(&WorkerCommand::SetDiscoverable(true)).await.unwrap();
        assert_eq!(
            *runner.calls.lock().unwrap(),
            vec!["power off".to_string(), "discoverable on".to_string()]
        );
        assert!(matches!(
            bt.apply(&WorkerCommand::ClearDiagnostics).await,
            Err(SampleError::Unsupported(_))
        ));
    }

    #[test]
    fn missing_flag_is_a_decode_error() {
        assert!(show_flag("Controller x\n\tPowered: maybe\n", "Powered").is_err());
        assert!(show_flag("Controller x\n", "Discoverable").is_err());
        assert_eq!(count_devices(""), 0);
    }
}
