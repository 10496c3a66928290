//! The byte stream to the BMS.
//!
//! The BMS sits behind a Bluetooth-UART bridge which the operating system
//! exposes as a serial port (`/dev/rfcomm0`, `COM13`, ...). Pairing and port
//! setup happen outside this crate.

use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

use crate::error::TransportError;

pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// A duplex byte stream
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Throw away anything already received and not yet read. Streams with
    /// no receive buffer of their own can leave this as is.
    async fn discard_input(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Write all of `bytes`
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read up to `max` bytes, giving up after `timeout`. Returns whatever
    /// arrived in that time, which may be fewer bytes than asked for or none.
    async fn read(&mut self, max: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Release the stream
    async fn close(self) -> Result<(), TransportError>
    where
        Self: Sized;
}

pub struct SerialTransport {
    port: SerialStream,
}

impl SerialTransport {
    /// Open a serial port at 8N1 with no flow control
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()?;

        tracing::info!(path, baud_rate, "serial port open");
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    async fn discard_input(&mut self) -> Result<(), TransportError> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes).await?;
        self.port.flush().await?;
        Ok(())
    }

    async fn read(&mut self, max: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; max];
        let mut filled = 0;

        while filled < max {
            match timeout_at(deadline, self.port.read(&mut buf[filled..])).await {
                Err(_) => break,
                Ok(Ok(0)) => return Err(TransportError::Closed),
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) if e.kind() == ErrorKind::TimedOut => break,
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        buf.truncate(filled);
        Ok(buf)
    }

    async fn close(mut self) -> Result<(), TransportError> {
        self.port.flush().await?;
        tracing::info!("serial port closed");
        Ok(())
    }
}
