//! SCRC Environment Abstraction Layer
//!
//! This crate isolates the racing client from the socket it talks through,
//! so that the session state machine can run against a real UDP socket in
//! **Production** and against an in-process server in **Simulation**.
//!
//! # Core Concept: Bounded Receive
//!
//! The race server speaks a strict request/response protocol over UDP:
//! - The client sends one payload (`send()`)
//! - The client waits a bounded time for the next payload (`recv()`)
//!
//! A receive that runs out of time is not a failure. It is reported as
//! [`Received::Timeout`] and the caller decides what to do next. Retry and
//! backoff decisions never live in the transport.
//!
//! # Example
//!
//! ```ignore
//! use scrc_env::{DatagramTransport, Received, TransportConfig, UdpTransport};
//!
//! let transport = UdpTransport::connect(TransportConfig::default()).await?;
//! transport.send("SCR(init -90 -75 ...)").await?;
//!
//! match transport.recv().await? {
//!     Received::Datagram(text) => println!("server said {text}"),
//!     Received::Timeout => println!("nothing yet"),
//! }
//! ```

mod config;
mod error;
mod transport;
mod udp;

pub use config::TransportConfig;
pub use error::TransportError;
pub use transport::{DatagramTransport, Received};
pub use udp::UdpTransport;
