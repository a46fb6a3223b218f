//! Control snapshot and the control surface interface.

use crate::codec::WireMessage;
use crate::sensors::SensorSnapshot;
use serde::{Deserialize, Serialize};

/// Actuator values sent to the race server for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlSnapshot {
    /// Throttle pedal, 0..1
    pub accel: f64,

    /// Brake pedal, 0..1
    pub brake: f64,

    /// Gear: -1 reverse, 0 neutral, 1..6
    pub gear: i32,

    /// Steering, -1 (full right) .. +1 (full left)
    pub steer: f64,

    /// Clutch pedal, 0..1
    pub clutch: f64,

    /// Focus sensor direction (degrees)
    pub focus: f64,

    /// Meta command, 1 requests a race restart
    pub meta: i32,
}

impl ControlSnapshot {
    /// Converts to the actuator message in the order the server documents.
    pub fn to_message(&self) -> WireMessage {
        WireMessage::new()
            .with_value("accel", self.accel)
            .with_value("brake", self.brake)
            .with_value("gear", f64::from(self.gear))
            .with_value("steer", self.steer)
            .with_value("clutch", self.clutch)
            .with_value("focus", self.focus)
            .with_value("meta", f64::from(self.meta))
    }

    /// Reads an actuator message; absent tags keep their default.
    pub fn from_message(msg: &WireMessage) -> Self {
        let defaults = Self::default();
        Self {
            accel: msg.first("accel").unwrap_or(defaults.accel),
            brake: msg.first("brake").unwrap_or(defaults.brake),
            gear: msg.first("gear").map_or(defaults.gear, |g| g.round() as i32),
            steer: msg.first("steer").unwrap_or(defaults.steer),
            clutch: msg.first("clutch").unwrap_or(defaults.clutch),
            focus: msg.first("focus").unwrap_or(defaults.focus),
            meta: msg.first("meta").map_or(defaults.meta, |m| m.round() as i32),
        }
    }
}

/// Producer of actuator values and consumer of sensor values.
///
/// Invoked synchronously by the session once per drive tick. Implementations
/// must not block: any slow input source belongs on its own thread, feeding
/// a buffer that the surface reads here.
pub trait ControlSurface: Send {
    /// Maps the latest sensor snapshot to the controls for this tick.
    fn on_sensor_snapshot(&mut self, sensors: &SensorSnapshot) -> ControlSnapshot;

    /// The server ended the race. No acknowledgement is expected.
    fn on_shutdown(&mut self) {}

    /// The server started a new episode. No acknowledgement is expected.
    fn on_restart(&mut self) {}
}

impl<S: ControlSurface + ?Sized> ControlSurface for Box<S> {
    fn on_sensor_snapshot(&mut self, sensors: &SensorSnapshot) -> ControlSnapshot {
        (**self).on_sensor_snapshot(sensors)
    }

    fn on_shutdown(&mut self) {
        (**self).on_shutdown()
    }

    fn on_restart(&mut self) {
        (**self).on_restart()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;

    #[test]
    fn test_default_controls_encoding() {
        let msg = ControlSnapshot::default().to_message();
        assert_eq!(
            encode(&msg),
            "(accel 0)(brake 0)(gear 0)(steer 0)(clutch 0)(focus 0)(meta 0)"
        );
    }

    #[test]
    fn test_message_conversion() {
        let control = ControlSnapshot {
            accel: 0.7,
            brake: 0.0,
            gear: -1,
            steer: -0.5,
            clutch: 0.2,
            focus: 0.0,
            meta: 0,
        };
        let msg = control.to_message();
        assert_eq!(msg.first("gear"), Some(-1.0));
        assert_eq!(ControlSnapshot::from_message(&msg), control);
    }

    #[test]
    fn test_from_partial_message() {
        let msg = WireMessage::new().with_value("meta", 1.0);
        let control = ControlSnapshot::from_message(&msg);
        assert_eq!(control.meta, 1);
        assert_eq!(control.accel, 0.0);
        assert_eq!(control.gear, 0);
    }
}
