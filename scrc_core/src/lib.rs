//! SCRC Core - Protocol codec and session state machine for the racing client
//!
//! This library solves the three jobs of a Simulated Car Racing client:
//! 1. **Wire format**: tagged-value text payloads via [`codec`]
//! 2. **Lifecycle**: identification, drive ticks, episodes and shutdown via [`session`]
//! 3. **Control hand-off**: sensor values out, actuator values in via [`control`]
//!
//! Manual driving ([`manual`]) and CSV telemetry ([`telemetry`]) plug into
//! the session through its control surface and observer seams.

pub mod codec;
pub mod config;
pub mod control;
pub mod error;
pub mod manual;
pub mod observer;
pub mod protocol;
pub mod sensors;
pub mod session;
pub mod telemetry;

// Re-export key types for convenience
pub use codec::{decode, encode, ProtocolError, WireMessage};
pub use config::{SessionConfig, Stage};
pub use control::{ControlSnapshot, ControlSurface};
pub use error::SessionError;
pub use manual::{ManualDriver, ManualInput, SharedInput};
pub use observer::{SessionObserver, TickRecord};
pub use sensors::SensorSnapshot;
pub use session::{Phase, Session, SessionMachine, SessionState, SessionStats, SessionSummary};
pub use telemetry::{CsvTelemetry, TelemetryError};
