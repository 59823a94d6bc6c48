//! # Hub: one explicitly constructed owner of store, supervisor and gateway.
//!
//! ```text
//! Hub::new(cfg) ──► StateStore (router)
//!               ──► Supervisor (event bus, status table, observers)
//!               ──► Gateway    (viewer connections)
//!
//! register_sampler(s, cfg) ──► SamplingWorker ──► Supervisor::register
//! start_all()              ──► every worker task
//! stop_all()               ──► workers (within grace) ──► gateway ──► store.close()
//! ```
//!
//! Nothing here is global: workers and gateway connections get their handles
//! from the hub when they are created.

use std::sync::Arc;

use tracing::info;

use crate::config::{HubConfig, SamplingConfig};
use crate::core::{Supervisor, SupervisorBuilder, WorkerState};
use crate::error::RuntimeError;
use crate::gateway::Gateway;
use crate::store::{Record, StateStore, Topic};
use crate::subscribers::Observe;
use crate::workers::{Sampler, SamplingWorker, WorkerCommand, WorkerRef};

/// Telemetry hub.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use telehub::{Hub, HubConfig, NetworkSampler, SamplingConfig, Topic};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let hub = Hub::new(HubConfig::default());
///     hub.register_sampler(
///         NetworkSampler::new("eth0", "wlan0"),
///         SamplingConfig::every(Duration::from_secs(3)),
///     )?;
///     hub.start_all();
///
///     tokio::time::sleep(Duration::from_millis(50)).await;
///     println!("{:?}", hub.read_latest(Topic::Network));
///
///     hub.stop_all().await?;
///     Ok(())
/// }
/// ```
pub struct Hub {
    store: Arc<StateStore>,
    supervisor: Arc<Supervisor>,
    gateway: Gateway,
}

impl Hub {
    /// Builds a hub without lifecycle observers. Must be called inside a
    /// Tokio runtime.
    pub fn new(cfg: HubConfig) -> Self {
        Self::with_observers(cfg, Vec::new())
    }

    /// Builds a hub whose lifecycle events also reach `observers`.
    pub fn with_observers(cfg: HubConfig, observers: Vec<Arc<dyn Observe>>) -> Self {
        let store = Arc::new(StateStore::new(cfg.router));
        let supervisor = SupervisorBuilder::new(cfg.supervisor, Arc::clone(&store))
            .with_observers(observers)
            .build();
        let gateway = Gateway::new(Arc::clone(&store), cfg.gateway);
        Self {
            store,
            supervisor,
            gateway,
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Handle for serving viewers; clones share the same shutdown signal.
    pub fn gateway(&self) -> Gateway {
        self.gateway.clone()
    }

    /// Registers a custom worker.
    pub fn register(&self, worker: WorkerRef) -> Result<(), RuntimeError> {
        self.supervisor.register(worker)
    }

    /// Wraps `sampler` in a [`SamplingWorker`] and registers it.
    pub fn register_sampler<S: Sampler>(
        &self,
        sampler: S,
        cfg: SamplingConfig,
    ) -> Result<(), RuntimeError> {
        let capacity = cfg.command_capacity.max(1);
        self.supervisor
            .register_with_capacity(SamplingWorker::arc(sampler, cfg), capacity)
    }

    pub fn start_all(&self) {
        self.supervisor.start_all();
    }

    /// Stops every worker, then disconnects viewers and closes the store.
    ///
    /// Viewers are released even when some workers had to be aborted; the
    /// abort is still reported as the result.
    pub async fn stop_all(&self) -> Result<(), RuntimeError> {
        let res = self.supervisor.stop_all().await;
        self.gateway.shutdown();
        self.store.close();
        info!(ok = res.is_ok(), "hub stopped");
        res
    }

    /// Waits for a termination signal, then behaves like [`stop_all`](Self::stop_all).
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        let res = self.supervisor.run_until_signal().await;
        self.gateway.shutdown();
        self.store.close();
        res
    }

    pub fn read_latest(&self, topic: Topic) -> Option<Arc<Record>> {
        self.store.read_latest(topic)
    }

    pub fn status(&self) -> Vec<WorkerState> {
        self.supervisor.status()
    }

    pub fn command(&self, topic: Topic, cmd: WorkerCommand) -> Result<(), RuntimeError> {
        self.supervisor.command(topic, cmd)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time;

    use super::*;
    use crate::core::WorkerStatus;
    use crate::error::SampleError;
    use crate::link::testing::{ScriptedConnector, at_modem};
    use crate::sources::{GpsSampler, ModemSampler};
    use crate::store::{ActiveInterface, NetworkStatus, Payload, SpeedUnit};

    struct Healthy;

    #[async_trait]
    impl Sampler for Healthy {
        fn topic(&self) -> Topic {
            Topic::Network
        }
        async fn sample(&mut self) -> Result<Payload, SampleError> {
            Ok(Payload::Network(NetworkStatus {
                active: ActiveInterface::Ethernet,
                ethernet_up: true,
                wifi_up: false,
            }))
        }
    }

    struct Broken;

    #[async_trait]
    impl Sampler for Broken {
        fn topic(&self) -> Topic {
            Topic::Obd
        }
        async fn sample(&mut self) -> Result<Payload, SampleError> {
            Err(SampleError::decode("garbled PID reply"))
        }
    }

    fn every(ms: u64) -> SamplingConfig {
        SamplingConfig::every(Duration::from_millis(ms))
    }

    async fn network_records_after(with_broken: bool, run: Duration) -> u64 {
        let hub = Hub::new(HubConfig::default());
        hub.register_sampler(Healthy, every(100)).unwrap();
        if with_broken {
            hub.register_sampler(Broken, every(10)).unwrap();
        }
        hub.start_all();
        time::sleep(run).await;
        let seq = hub.read_latest(Topic::Network).unwrap().sequence;
        hub.stop_all().await.unwrap();
        seq
    }

    #[tokio::test(start_paused = true)]
    async fn failing_worker_does_not_slow_the_others() {
        let run = Duration::from_millis(1050);
        let alone = network_records_after(false, run).await;
        let beside_broken = network_records_after(true, run).await;
        assert!(alone >= 10);
        assert_eq!(alone, beside_broken);
    }

    #[tokio::test(start_paused = true)]
    async fn faulted_worker_reports_error_and_restarts() {
        let hub = Hub::new(HubConfig::default());
        hub.register_sampler(Broken, every(10)).unwrap();
        hub.register_sampler(Healthy, every(100)).unwrap();
        hub.start_all();
        time::sleep(Duration::from_secs(4)).await;

        let status = hub.status();
        let obd = status.iter().find(|s| s.topic == Topic::Obd).unwrap();
        assert!(obd.restart_count >= 2, "{obd:?}");
        assert!(obd.last_error.as_deref().unwrap().contains("garbled"));
        assert_eq!(obd.records, 0);
        assert!(hub.read_latest(Topic::Obd).is_none());

        let net = status.iter().find(|s| s.topic == Topic::Network).unwrap();
        assert_eq!(net.status, WorkerStatus::Running);
        assert_eq!(net.restart_count, 0);

        hub.stop_all().await.unwrap();
        assert!(hub.status().iter().all(|s| s.status == WorkerStatus::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_one_worker_releases_its_device_only() {
        let modem_port = Arc::new(ScriptedConnector::new().device("/dev/ttyUSB2", at_modem));
        let gps_port = Arc::new(ScriptedConnector::new().device("/dev/ttyUSB1", at_modem));
        let hub = Hub::new(HubConfig::default());
        hub.register_sampler(ModemSampler::new(modem_port.clone(), ["/dev/ttyUSB2"]), every(1000))
            .unwrap();
        hub.register_sampler(GpsSampler::new(gps_port.clone(), ["/dev/ttyUSB1"]), every(1000))
            .unwrap();
        hub.start_all();
        time::sleep(Duration::from_millis(2500)).await;

        hub.supervisor().stop(Topic::Modem).await.unwrap();
        for _ in 0..100 {
            if modem_port.hangups() == 1 {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(modem_port.hangups(), 1);
        assert_eq!(gps_port.hangups(), 0);

        let modem_seq = hub.read_latest(Topic::Modem).unwrap().sequence;
        let gps_seq = hub.read_latest(Topic::Gps).unwrap().sequence;
        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(hub.read_latest(Topic::Modem).unwrap().sequence, modem_seq);
        assert!(hub.read_latest(Topic::Gps).unwrap().sequence > gps_seq);

        hub.stop_all().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn command_changes_later_records() {
        let port = Arc::new(ScriptedConnector::new().device("/dev/ttyUSB1", at_modem));
        let hub = Hub::new(HubConfig::default());
        hub.register_sampler(GpsSampler::new(port, ["/dev/ttyUSB1"]), every(500))
            .unwrap();
        hub.start_all();
        time::sleep(Duration::from_millis(250)).await;

        let Payload::Gps(fix) = &hub.read_latest(Topic::Gps).unwrap().payload else {
            panic!("expected a gps payload");
        };
        assert_eq!(fix.unit, SpeedUnit::Mph);

        hub.command(Topic::Gps, WorkerCommand::SetSpeedUnit(SpeedUnit::Kmh))
            .unwrap();
        time::sleep(Duration::from_secs(1)).await;
        let Payload::Gps(fix) = &hub.read_latest(Topic::Gps).unwrap().payload else {
            panic!("expected a gps payload");
        };
        assert_eq!(fix.unit, SpeedUnit::Kmh);

        assert!(matches!(
            hub.command(Topic::Ups, WorkerCommand::Reconnect),
            Err(RuntimeError::UnknownTopic { topic: Topic::Ups })
        ));
        hub.stop_all().await.unwrap();
    }
}
