//! Log status data from ANT Battery Management Systems over a Bluetooth-UART serial link
//!
//! Tested with a 20S LG INR18650-MJ1 pack whose BMS is paired as a classic
//! Bluetooth serial port (`/dev/rfcomm0` on Linux, `COMn` on Windows).
//!
//! The BMS answers a fixed 6 byte poll with a fixed 140 byte status frame. There
//! is no checksum or length prefix, so a response of the right length is the
//! only sign of a good frame. Short responses are dropped and the next poll
//! tried.
//!
//! Each good frame yields:
//!
//! - Pack voltage (V)
//! - Pack current (A)
//! - Mean temperature (°C)
//! - Cycles (count)
//! - State of charge (%)
//!
//! and, derived across samples:
//!
//! - Rate of voltage change (V/s)
//! - Discharged capacity (Ah)
//!
//! Samples are appended to a CSV file.
//!
//! # Example
//!
//! ```no_run
//! # use antlog::{CsvLog, SerialTransport, SessionConfig, TelemetrySession};
//! #
//! # #[tokio::main]
//! # pub async fn main() -> anyhow::Result<()> {
//!     let transport = SerialTransport::open("/dev/rfcomm0", 9600)?;
//!     let log = CsvLog::open("bms_data.csv")?;
//!     let session = TelemetrySession::new(transport, log, SessionConfig::default());
//!     session.run(async { tokio::signal::ctrl_c().await.ok(); }).await?;
//! #   Ok(())
//! # }
//! ```

mod battery_sample;
mod bms_client;
mod derived;
mod error;
pub mod message;
mod record_log;
mod session;
mod transport;

pub use battery_sample::BatterySample;
pub use bms_client::BmsClient;
pub use derived::{PackSpec, SessionState};
pub use error::{DecodeError, PersistenceError, SessionError, TransportError};
pub use message::status_frame::{decode, encode_poll_command, FRAME_LEN};
pub use record_log::{CsvLog, LogRecord, RecordSink, HEADER};
pub use session::{CycleOutcome, SessionConfig, TelemetrySession};
pub use transport::{SerialTransport, Transport, DEFAULT_BAUD_RATE};
