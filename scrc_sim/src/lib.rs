//! SCRC Simulation Harness
//!
//! Runs a real [`scrc_core::Session`] against an in-process race server so
//! that protocol behaviour can be tested without a simulator install.
//!
//! # Core Principle: One Seed, One Run
//!
//! All sources of non-determinism are owned by the server:
//! - **Network**: lost acknowledgements and sensor datagrams
//! - **Payloads**: malformed sensor data injected in place of real readings
//! - **Randomness**: every decision drawn from a single ChaCha stream
//!
//! There is no wall clock involved. A missed receive window is an empty
//! reply queue, so runs are instant and repeat exactly.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    ScenarioRunner                    │
//! │                                                      │
//! │  ┌──────────────────┐   send/recv   ┌─────────────┐  │
//! │  │ Session          │◄─────────────►│ SimServer   │  │
//! │  │  └ HarnessDriver │               │  └ SimCar   │  │
//! │  └──────────────────┘               └─────────────┘  │
//! │            │                               │         │
//! │            └──────── invariant checks ◄────┘         │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use scrc_sim::{ScenarioId, ScenarioRunner};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::Handshake).await;
//! assert!(result.passed);
//! ```

mod car;
mod runner;
pub mod scenarios;
mod server;

pub use car::SimCar;
pub use runner::{HarnessDriver, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use server::{RacePhase, ServerConfig, ServerStats, SimServer};
