//! Session-level errors.

use scrc_env::TransportError;
use thiserror::Error;

/// Conditions that end a session early.
///
/// Malformed payloads and receive timeouts are not here: the session logs
/// them and carries on.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Sending to the race server failed
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The configured identification cap ran out without an acknowledgement
    #[error("No identification acknowledgement after {attempts} attempts")]
    IdentificationExhausted { attempts: u32 },
}
