//! `telehubd`: runs the telemetry hub on a gateway and serves viewers over
//! a websocket at `GET /ws`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use telehub::{
    BluetoothSampler, Connector, GpsSampler, Hub, HubConfig, LogWriter, ModemSampler,
    NetworkSampler, ObdSampler, Observe, SamplingConfig, SerialConnector, SystemSampler,
    UpsSampler,
};

use error::DaemonError;

mod error {
    use std::net::SocketAddr;

    #[derive(Debug, thiserror::Error)]
    pub enum DaemonError {
        #[error("register sources: {0}")]
        Register(#[source] telehub::RuntimeError),

        #[error("bind {addr}: {source}")]
        Bind {
            addr: SocketAddr,
            #[source]
            source: std::io::Error,
        },

        #[error("shutdown: {0}")]
        Shutdown(#[source] telehub::RuntimeError),
    }
}

#[derive(Debug, Parser)]
#[command(name = "telehubd", version, about = "Telemetry supervision and fan-out hub")]
struct Cli {
    /// Address the websocket gateway listens on.
    #[arg(long, env = "TELEHUB_WS_ADDR", default_value = "0.0.0.0:9000")]
    ws_addr: SocketAddr,

    /// Candidate serial ports of the cellular modem.
    #[arg(long, value_delimiter = ',', default_value = "/dev/ttyUSB2,/dev/ttyUSB3")]
    modem_ports: Vec<String>,

    /// Candidate serial ports of the GNSS receiver.
    #[arg(long, value_delimiter = ',', default_value = "/dev/ttyUSB1")]
    gps_ports: Vec<String>,

    /// Candidate serial ports of the ELM327 adapter.
    #[arg(long, value_delimiter = ',', default_value = "/dev/rfcomm0,/dev/ttyUSB0")]
    obd_ports: Vec<String>,

    /// Power-supply directory of the backup battery.
    #[arg(long, default_value = "/sys/class/power_supply/battery")]
    ups_supply: String,

    #[arg(long, default_value = "eth0")]
    ethernet: String,

    #[arg(long, default_value = "wlan0")]
    wifi: String,

    /// Do not sample the bluetooth controller.
    #[arg(long)]
    no_bluetooth: bool,

    /// Mount point whose usage is reported under `system`.
    #[arg(long, default_value = "/")]
    disk: String,

    /// Baud rate of the AT ports.
    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    #[arg(long, default_value_t = 38_400)]
    obd_baud: u32,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log: String,
}

fn every(secs: u64) -> SamplingConfig {
    SamplingConfig::every(Duration::from_secs(secs))
}

fn register_sources(hub: &Hub, cli: &Cli) -> Result<(), telehub::RuntimeError> {
    let at: Arc<dyn Connector> = Arc::new(SerialConnector::new(cli.baud));
    let elm: Arc<dyn Connector> = Arc::new(SerialConnector::new(cli.obd_baud));

    hub.register_sampler(GpsSampler::new(Arc::clone(&at), cli.gps_ports.clone()), every(1))?;
    hub.register_sampler(ModemSampler::new(at, cli.modem_ports.clone()), every(5))?;
    hub.register_sampler(ObdSampler::new(elm, cli.obd_ports.clone()), every(1))?;
    hub.register_sampler(UpsSampler::new(&cli.ups_supply), every(2))?;
    hub.register_sampler(
        NetworkSampler::new(cli.ethernet.clone(), cli.wifi.clone()),
        every(3),
    )?;
    if !cli.no_bluetooth {
        hub.register_sampler(BluetoothSampler::system(), every(5))?;
    }
    hub.register_sampler(SystemSampler::new().with_disk(&cli.disk), every(2))?;
    Ok(())
}

async fn run(cli: Cli) -> Result<(), DaemonError> {
    let observers: Vec<Arc<dyn Observe>> = vec![Arc::new(LogWriter::new())];
    let hub = Hub::with_observers(HubConfig::default(), observers);
    register_sources(&hub, &cli).map_err(DaemonError::Register)?;

    let listener = tokio::net::TcpListener::bind(cli.ws_addr)
        .await
        .map_err(|source| DaemonError::Bind {
            addr: cli.ws_addr,
            source,
        })?;
    info!(addr = %cli.ws_addr, "gateway listening");

    let shutdown = CancellationToken::new();
    let app = telehub::router(hub.gateway());
    let server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future(),
    );

    hub.start_all();
    let stopped = hub.run_until_signal().await;

    shutdown.cancel();
    match tokio::time::timeout(Duration::from_secs(5), server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "gateway server failed"),
        Ok(Err(e)) => warn!(error = %e, "gateway server task died"),
        Err(_) => warn!("gateway server did not drain in time"),
    }

    stopped.map_err(DaemonError::Shutdown)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log.as_str().into()),
        )
        .init();

    if let Err(e) = run(cli).await {
        error!("{e}");
        std::process::exit(1);
    }
}
