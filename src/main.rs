use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use antlog::{
    BmsClient, CsvLog, PackSpec, SerialTransport, SessionConfig, TelemetrySession,
    DEFAULT_BAUD_RATE,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Poll an ANT BMS over a Bluetooth serial port and log its status to CSV
#[derive(Parser)]
#[command(name = "antlog", version)]
struct Cli {
    /// Serial port the BMS is paired on, e.g. /dev/rfcomm0 or COM13
    #[arg(long, default_value = "/dev/rfcomm0")]
    port: String,

    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// CSV file to append samples to
    #[arg(long, default_value = "bms_data.csv")]
    output: PathBuf,

    /// Seconds between polls
    #[arg(long, default_value_t = 10)]
    interval_secs: u64,

    /// Milliseconds to let the BMS answer before reading
    #[arg(long, default_value_t = 1000)]
    settle_ms: u64,

    /// Milliseconds to keep reading a response
    #[arg(long, default_value_t = 1000)]
    read_timeout_ms: u64,

    /// Rated pack energy in Wh
    #[arg(long, default_value_t = PackSpec::DEFAULT.rated_energy_wh)]
    rated_energy_wh: f64,

    /// Nominal cell voltage in V
    #[arg(long, default_value_t = PackSpec::DEFAULT.nominal_voltage_v)]
    nominal_voltage: f64,

    /// Give up after this many bad frames in a row (default: never)
    #[arg(long)]
    max_failures: Option<u32>,

    /// Print state of charge and voltage once, without logging
    #[arg(long)]
    once: bool,
}

impl Cli {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            interval: Duration::from_secs(self.interval_secs),
            settle_delay: Duration::from_millis(self.settle_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            pack: PackSpec {
                rated_energy_wh: self.rated_energy_wh,
                nominal_voltage_v: self.nominal_voltage,
            },
            max_consecutive_failures: self.max_failures,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.session_config();

    let transport = SerialTransport::open(&cli.port, cli.baud)
        .with_context(|| format!("Failed to open BMS serial port {}", cli.port))?;

    if cli.once {
        return read_once(transport, &config).await;
    }

    let log = CsvLog::open(&cli.output)
        .with_context(|| format!("Failed to open log {}", cli.output.display()))?;
    tracing::info!("[ANT-BMS] Logging to {}", cli.output.display());

    let session = TelemetrySession::new(transport, log, config);
    session
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

async fn read_once(transport: SerialTransport, config: &SessionConfig) -> anyhow::Result<()> {
    let client = BmsClient::new(transport, config.settle_delay, config.read_timeout);

    match client.read_once().await? {
        Ok(sample) => println!(
            "SoC: {}% | Voltage: {:.2}V",
            sample.state_of_charge_pct, sample.voltage_v
        ),
        Err(e) => {
            tracing::debug!("{e}");
            println!("No valid frame received");
        }
    }

    Ok(())
}
