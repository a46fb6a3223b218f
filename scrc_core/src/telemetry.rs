//! CSV telemetry log, one row per drive tick.
//!
//! Rows are appended to an existing log; the header is only written when
//! the file is created. A failed write is logged and the race goes on.

use crate::observer::{SessionObserver, TickRecord};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Column names, in row order.
pub const TELEMETRY_COLUMNS: [&str; 15] = [
    "Car model",
    "curLapTime",
    "speedX",
    "speedY",
    "speedZ",
    "trackPos",
    "steer",
    "gear",
    "rpm",
    "damage",
    "track",
    "opponents",
    "racePos",
    "acceleration",
    "brake",
];

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Telemetry I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Telemetry CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Session observer writing telemetry rows as CSV.
pub struct CsvTelemetry<W: Write> {
    writer: csv::Writer<W>,
    car_model: String,
    rows: u64,
}

impl CsvTelemetry<File> {
    /// Opens `path` for appending, writing the header if the file is new.
    pub fn append(path: impl AsRef<Path>, car_model: impl Into<String>) -> Result<Self, TelemetryError> {
        let path = path.as_ref();
        let is_new = !path.exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Self::from_writer(file, car_model, is_new)
    }
}

impl<W: Write> CsvTelemetry<W> {
    /// Wraps any writer; `write_header` controls whether the column row is emitted.
    pub fn from_writer(
        writer: W,
        car_model: impl Into<String>,
        write_header: bool,
    ) -> Result<Self, TelemetryError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        if write_header {
            writer.write_record(TELEMETRY_COLUMNS)?;
            writer.flush()?;
        }
        Ok(Self {
            writer,
            car_model: car_model.into(),
            rows: 0,
        })
    }

    /// Rows written so far (header excluded).
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }

    /// Appends one row and flushes it.
    pub fn write_row(&mut self, record: &TickRecord<'_>) -> Result<(), TelemetryError> {
        let sensors = record.sensors;
        let control = record.control;

        let row: [String; 15] = [
            self.car_model.clone(),
            number(sensors.cur_lap_time()),
            number(sensors.speed_x()),
            number(sensors.speed_y()),
            number(sensors.speed_z()),
            number(sensors.track_pos()),
            control.steer.to_string(),
            control.gear.to_string(),
            number(sensors.rpm()),
            number(sensors.damage()),
            joined(sensors.track()),
            joined(sensors.opponents()),
            sensors.race_pos().map(|p| p.to_string()).unwrap_or_default(),
            control.accel.to_string(),
            control.brake.to_string(),
        ];

        self.writer.write_record(&row)?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }
}

impl<W: Write + Send> SessionObserver for CsvTelemetry<W> {
    fn on_tick(&mut self, record: &TickRecord<'_>) {
        if let Err(e) = self.write_row(record) {
            warn!("Dropping telemetry row (episode {}, step {}): {}", record.episode, record.step, e);
        }
    }
}

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn joined(values: Option<&[f64]>) -> String {
    values
        .map(|v| v.iter().map(f64::to_string).collect::<Vec<_>>().join(","))
        .unwrap_or_default()
}
