//! Fixed protocol vocabulary of the race server.

use crate::codec::{encode, WireMessage};

/// Substring acknowledging a successful identification.
pub const IDENTIFIED_TOKEN: &str = "***identified***";

/// Substring announcing the end of the race.
pub const SHUTDOWN_TOKEN: &str = "***shutdown***";

/// Substring announcing the start of a new episode.
pub const RESTART_TOKEN: &str = "***restart***";

/// Directive asking the server to end the current episode.
pub const END_OF_EPISODE: &str = "(meta 1)";

/// Tag carrying the rangefinder layout in the identification request.
pub const INIT_TAG: &str = "init";

/// Number of rangefinder beams.
pub const RANGEFINDER_COUNT: usize = 19;

/// Rangefinder beam directions in degrees, symmetric about zero.
///
/// Outer beams step 15° inward from ±90° down to ±30°, inner beams step 5°
/// from ±20° down to ±5°, and the centre beam looks straight ahead.
pub fn rangefinder_angles() -> [f64; RANGEFINDER_COUNT] {
    let mut angles = [0.0; RANGEFINDER_COUNT];
    let last = RANGEFINDER_COUNT - 1;

    for i in 0..5 {
        let a = -90.0 + 15.0 * i as f64;
        angles[i] = a;
        angles[last - i] = -a;
    }
    for i in 5..9 {
        let a = -20.0 + 5.0 * (i - 5) as f64;
        angles[i] = a;
        angles[last - i] = -a;
    }
    angles
}

/// Builds the identification request: the bot id immediately followed by
/// the encoded `init` message.
pub fn identification_request(bot_id: &str, angles: &[f64]) -> String {
    let init = WireMessage::new().with(INIT_TAG, angles.to_vec());
    format!("{bot_id}{}", encode(&init))
}

/// Server-side signal recognised in a received payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerSignal {
    Shutdown,
    Restart,
}

impl ServerSignal {
    /// Scans a payload for a control token. Shutdown wins over restart.
    pub fn detect(payload: &str) -> Option<Self> {
        if payload.contains(SHUTDOWN_TOKEN) {
            Some(ServerSignal::Shutdown)
        } else if payload.contains(RESTART_TOKEN) {
            Some(ServerSignal::Restart)
        } else {
            None
        }
    }
}

/// True when the payload acknowledges identification.
pub fn is_identified(payload: &str) -> bool {
    payload.contains(IDENTIFIED_TOKEN)
}
