//! The polling loop: poll, read, decode, derive, record, wait, repeat.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::Local;
use tokio::time::{sleep_until, Instant};

use crate::bms_client::BmsClient;
use crate::derived::{PackSpec, SessionState};
use crate::error::{DecodeError, PersistenceError, SessionError};
use crate::message::status_frame;
use crate::record_log::{LogRecord, RecordSink};
use crate::transport::Transport;

/// Timing and pack settings for a [`TelemetrySession`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    /// Spacing between the starts of consecutive polls
    pub interval: Duration,
    /// Wait between sending a poll and reading its response
    pub settle_delay: Duration,
    /// Upper bound on reading one response
    pub read_timeout: Duration,
    pub pack: PackSpec,
    /// Stop after this many bad frames in a row. `None` retries forever.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            settle_delay: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            pack: PackSpec::DEFAULT,
            max_consecutive_failures: None,
        }
    }
}

/// What became of one poll
#[derive(Debug)]
pub enum CycleOutcome {
    /// The sample was decoded and appended to the log
    Recorded(LogRecord),
    /// The response was unusable; nothing was recorded
    Skipped(DecodeError),
    /// The sample was decoded but could not be appended
    NotPersisted(LogRecord, PersistenceError),
}

impl CycleOutcome {
    /// Emit the status line for this cycle
    fn report(&self) {
        match self {
            CycleOutcome::Recorded(record) => tracing::info!("{}", record.summary()),
            CycleOutcome::Skipped(e) => tracing::warn!("{e}, retrying"),
            CycleOutcome::NotPersisted(record, e) => {
                tracing::error!("{} not recorded: {e}", record.summary())
            }
        }
    }
}

/// Polls one BMS on a fixed interval and appends every good sample to a log.
pub struct TelemetrySession<T, S> {
    client: BmsClient<T>,
    sink: S,
    state: SessionState,
    config: SessionConfig,
    consecutive_failures: u32,
}

impl<T: Transport, S: RecordSink> TelemetrySession<T, S> {
    pub fn new(transport: T, sink: S, config: SessionConfig) -> Self {
        Self {
            client: BmsClient::new(transport, config.settle_delay, config.read_timeout),
            sink,
            state: SessionState::new(),
            config,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Turn one raw response taken at `at` into a log record.
    ///
    /// The voltage baseline for dV/dt moves forward as soon as a frame
    /// decodes, whether or not the record can then be stored.
    pub fn record_frame(&mut self, raw: &[u8], at: Instant) -> CycleOutcome {
        let sample = match status_frame::decode(raw) {
            Ok(sample) => sample,
            Err(e) => return CycleOutcome::Skipped(e),
        };

        let record = LogRecord {
            timestamp: Local::now(),
            sample,
            dv_dt: self.state.advance(sample.voltage_v, at),
            discharged_ah: self.config.pack.discharged_ah(sample.state_of_charge_pct),
        };

        match self.sink.append(&record) {
            Ok(()) => CycleOutcome::Recorded(record),
            Err(e) => CycleOutcome::NotPersisted(record, e),
        }
    }

    /// Run a single poll cycle without waiting out the interval
    pub async fn poll_once(&mut self) -> Result<CycleOutcome, SessionError> {
        let raw = self.client.fetch_frame().await?;
        let outcome = self.record_frame(&raw, Instant::now());
        outcome.report();
        self.count_failure(&outcome)?;
        Ok(outcome)
    }

    /// Poll until `shutdown` completes or the transport fails.
    ///
    /// Shutdown is only noticed while waiting on the BMS or on the interval,
    /// so a cycle is either recorded in full or abandoned before decoding.
    /// Either way the log is flushed and the transport closed before this
    /// returns.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        let result = self.poll_until(shutdown.as_mut()).await;

        if let Err(e) = &result {
            tracing::error!("session stopped: {e}");
        }
        if let Err(e) = self.sink.flush() {
            tracing::error!("failed to flush log: {e}");
        }
        if let Err(e) = self.client.close().await {
            tracing::error!("failed to close transport: {e}");
        }

        result
    }

    async fn poll_until<F>(&mut self, mut shutdown: Pin<&mut F>) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        loop {
            let cycle_start = Instant::now();

            let raw = tokio::select! {
                raw = self.client.fetch_frame() => raw?,
                _ = shutdown.as_mut() => {
                    tracing::info!("shutdown requested, abandoning cycle");
                    return Ok(());
                }
            };

            let outcome = self.record_frame(&raw, Instant::now());
            outcome.report();
            self.count_failure(&outcome)?;

            tokio::select! {
                _ = sleep_until(cycle_start + self.config.interval) => {}
                _ = shutdown.as_mut() => {
                    tracing::info!("shutdown requested");
                    return Ok(());
                }
            }
        }
    }

    fn count_failure(&mut self, outcome: &CycleOutcome) -> Result<(), SessionError> {
        if !matches!(outcome, CycleOutcome::Skipped(_)) {
            self.consecutive_failures = 0;
            return Ok(());
        }

        self.consecutive_failures += 1;
        match self.config.max_consecutive_failures {
            Some(max) if self.consecutive_failures >= max => Err(SessionError::TooManyFailures {
                count: self.consecutive_failures,
            }),
            _ => Ok(()),
        }
    }
}
