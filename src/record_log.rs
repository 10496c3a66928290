//! Append-only sample log.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Local, SecondsFormat};

use crate::battery_sample::BatterySample;
use crate::error::PersistenceError;

/// Column names, in the order every record is written
pub const HEADER: [&str; 8] = [
    "timestamp",
    "voltage_V",
    "current_A",
    "temp_C",
    "dVdt_V/s",
    "cycle_idx",
    "discharge_Ah",
    "SoC_%",
];

/// One row of the log
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub sample: BatterySample,
    /// Rate of voltage change since the previous sample in V/s
    pub dv_dt: f64,
    /// Capacity drawn from the pack in Ah
    pub discharged_ah: f64,
}

impl LogRecord {
    pub fn fields(&self) -> [String; 8] {
        [
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, false),
            format!("{:.2}", self.sample.voltage_v),
            format!("{:.2}", self.sample.current_a),
            format!("{:.4}", self.sample.temperature_c),
            format!("{:.6}", self.dv_dt),
            self.sample.cycle_index.to_string(),
            format!("{:.3}", self.discharged_ah),
            self.sample.state_of_charge_pct.to_string(),
        ]
    }

    /// A single line for the operator
    pub fn summary(&self) -> String {
        let s = &self.sample;
        format!(
            "V={:.2}V I={:.2}A T={:.1}°C dVdt={:.4}V/s Cyc={} Dis={:.2}Ah SoC={}%",
            s.voltage_v,
            s.current_a,
            s.temperature_c,
            self.dv_dt,
            s.cycle_index,
            self.discharged_ah,
            s.state_of_charge_pct
        )
    }
}

/// Somewhere records can be appended to
pub trait RecordSink {
    fn append(&mut self, record: &LogRecord) -> Result<(), PersistenceError>;

    fn flush(&mut self) -> Result<(), PersistenceError>;
}

/// A CSV file which is only ever appended to.
///
/// The header row is written when the file is created (or found empty) and
/// never again, so any number of sessions can share one file.
///
/// Each row is encoded in full before it is written out, and nothing is held
/// back between appends. A row that fails to write is gone and can never
/// reach the file on a later append.
pub struct CsvLog<W = File> {
    out: W,
}

impl CsvLog<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_new = file.metadata()?.len() == 0;

        if is_new {
            tracing::info!("created log {}", path.display());
        } else {
            tracing::info!("appending to existing log {}", path.display());
        }
        Self::from_writer(file, is_new)
    }
}

impl<W: Write> CsvLog<W> {
    /// Log to any writer, writing the header row first if `write_header`
    pub fn from_writer(out: W, write_header: bool) -> Result<Self, PersistenceError> {
        let mut log = Self { out };
        if write_header {
            log.write_row(HEADER)?;
        }
        Ok(log)
    }

    fn write_row<I, F>(&mut self, fields: I) -> Result<(), PersistenceError>
    where
        I: IntoIterator<Item = F>,
        F: AsRef<[u8]>,
    {
        let mut row = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        row.write_record(fields)?;
        let row = row.into_inner().map_err(|e| e.into_error())?;

        self.out.write_all(&row)?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> RecordSink for CsvLog<W> {
    fn append(&mut self, record: &LogRecord) -> Result<(), PersistenceError> {
        self.write_row(record.fields())
    }

    fn flush(&mut self) -> Result<(), PersistenceError> {
        self.out.flush()?;
        Ok(())
    }
}
