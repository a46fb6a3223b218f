//! Read-only view over a decoded sensor payload.

use crate::codec::WireMessage;

/// Sensor snapshot delivered to the control surface each tick.
///
/// Wraps the decoded [`WireMessage`] without copying it. Typed accessors
/// cover the tags the race server is known to send; anything else is
/// reachable through [`SensorSnapshot::message`].
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSnapshot {
    message: WireMessage,
}

impl SensorSnapshot {
    pub fn new(message: WireMessage) -> Self {
        Self { message }
    }

    /// Returns the underlying message.
    pub fn message(&self) -> &WireMessage {
        &self.message
    }

    /// Returns the first value of an arbitrary tag.
    pub fn scalar(&self, tag: &str) -> Option<f64> {
        self.message.first(tag)
    }

    /// Returns all values of an arbitrary tag.
    pub fn values(&self, tag: &str) -> Option<&[f64]> {
        self.message.get(tag)
    }

    /// Angle between the car heading and the track axis (rad)
    pub fn angle(&self) -> Option<f64> {
        self.scalar("angle")
    }

    /// Time elapsed in the current lap (s)
    pub fn cur_lap_time(&self) -> Option<f64> {
        self.scalar("curLapTime")
    }

    pub fn last_lap_time(&self) -> Option<f64> {
        self.scalar("lastLapTime")
    }

    /// Current damage (points)
    pub fn damage(&self) -> Option<f64> {
        self.scalar("damage")
    }

    /// Distance from the start line along the track (m)
    pub fn dist_from_start(&self) -> Option<f64> {
        self.scalar("distFromStart")
    }

    /// Distance covered since the start of the race (m)
    pub fn dist_raced(&self) -> Option<f64> {
        self.scalar("distRaced")
    }

    pub fn fuel(&self) -> Option<f64> {
        self.scalar("fuel")
    }

    /// Current gear: -1 reverse, 0 neutral, 1..6
    pub fn gear(&self) -> Option<i32> {
        self.scalar("gear").map(|g| g.round() as i32)
    }

    /// Distances to opponents in 36 sectors around the car (m)
    pub fn opponents(&self) -> Option<&[f64]> {
        self.values("opponents")
    }

    /// Position in the race
    pub fn race_pos(&self) -> Option<i32> {
        self.scalar("racePos").map(|p| p.round() as i32)
    }

    pub fn rpm(&self) -> Option<f64> {
        self.scalar("rpm")
    }

    /// Longitudinal speed (km/h)
    pub fn speed_x(&self) -> Option<f64> {
        self.scalar("speedX")
    }

    /// Lateral speed (km/h)
    pub fn speed_y(&self) -> Option<f64> {
        self.scalar("speedY")
    }

    /// Vertical speed (km/h)
    pub fn speed_z(&self) -> Option<f64> {
        self.scalar("speedZ")
    }

    /// Rangefinder distances to the track edge, one per configured angle (m)
    pub fn track(&self) -> Option<&[f64]> {
        self.values("track")
    }

    /// Lateral position: 0 on the axis, -1/+1 on the right/left edge
    pub fn track_pos(&self) -> Option<f64> {
        self.scalar("trackPos")
    }

    /// Wheel spin velocities (rad/s)
    pub fn wheel_spin_vel(&self) -> Option<&[f64]> {
        self.values("wheelSpinVel")
    }

    /// Height of the car's centre of mass above the track (m)
    pub fn z(&self) -> Option<f64> {
        self.scalar("z")
    }

    /// Focus sensor readings (m)
    pub fn focus(&self) -> Option<&[f64]> {
        self.values("focus")
    }
}

impl From<WireMessage> for SensorSnapshot {
    fn from(message: WireMessage) -> Self {
        Self::new(message)
    }
}
