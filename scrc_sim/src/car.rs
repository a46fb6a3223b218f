//! Kinematic car model standing in for the race server's physics.
//!
//! Deliberately crude: a point mass on a straight track of fixed width.
//! It only has to produce plausible sensor values that react to the
//! controls the client sends.

use scrc_core::protocol::rangefinder_angles;
use scrc_core::{ControlSnapshot, WireMessage};

/// Simulation step per server tick (s)
pub const TICK_SECS: f64 = 0.02;

/// Track width (m)
pub const TRACK_WIDTH: f64 = 12.0;

/// Track length (m)
pub const TRACK_LENGTH: f64 = 3_000.0;

/// Rangefinder range (m)
pub const RANGEFINDER_RANGE: f64 = 200.0;

const OPPONENT_SECTORS: usize = 36;
const WHEEL_RADIUS: f64 = 0.3;

// km/h per second at full pedal
const ACCEL_RATE: f64 = 36.0;
const BRAKE_RATE: f64 = 72.0;
const DRAG: f64 = 0.05;

/// State of the simulated car.
#[derive(Debug, Clone, PartialEq)]
pub struct SimCar {
    /// Longitudinal speed (km/h)
    pub speed_x: f64,

    /// Heading relative to the track axis (rad)
    pub angle: f64,

    /// Lateral position, -1/+1 on the right/left edge
    pub track_pos: f64,

    pub gear: i32,
    pub damage: f64,
    pub fuel: f64,
    pub cur_lap_time: f64,
    pub last_lap_time: f64,
    pub dist_raced: f64,
}

impl Default for SimCar {
    fn default() -> Self {
        Self {
            speed_x: 0.0,
            angle: 0.0,
            track_pos: 0.0,
            gear: 0,
            damage: 0.0,
            fuel: 94.0,
            cur_lap_time: 0.0,
            last_lap_time: 0.0,
            dist_raced: 0.0,
        }
    }
}

impl SimCar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the car by one tick under `control`.
    pub fn step(&mut self, control: &ControlSnapshot) {
        let dt = TICK_SECS;
        self.gear = control.gear;

        let drive = if self.gear == 0 {
            0.0
        } else {
            control.accel.clamp(0.0, 1.0) * ACCEL_RATE * f64::from(self.gear.signum())
        };
        let braking = control.brake.clamp(0.0, 1.0) * BRAKE_RATE * dt;
        let mut speed = self.speed_x + (drive - DRAG * self.speed_x) * dt;

        // Brakes stop the car, they never reverse it
        if speed.abs() <= braking {
            speed = 0.0;
        } else {
            speed -= braking * speed.signum();
        }
        self.speed_x = speed;

        self.angle = (self.angle + control.steer.clamp(-1.0, 1.0) * 0.5 * dt)
            .clamp(-std::f64::consts::PI, std::f64::consts::PI);

        let metres = self.speed_x / 3.6 * dt;
        self.track_pos += self.angle.sin() * metres / (TRACK_WIDTH / 2.0);
        self.track_pos = self.track_pos.clamp(-2.0, 2.0);
        if self.is_off_track() {
            self.damage += 1.0;
        }

        self.fuel = (self.fuel - control.accel.max(0.0) * 0.001).max(0.0);
        self.cur_lap_time += dt;
        let before = self.dist_raced.rem_euclid(TRACK_LENGTH);
        self.dist_raced += metres.abs();
        if self.dist_raced.rem_euclid(TRACK_LENGTH) < before {
            self.last_lap_time = self.cur_lap_time;
            self.cur_lap_time = 0.0;
        }
    }

    pub fn is_off_track(&self) -> bool {
        self.track_pos.abs() > 1.0
    }

    /// Engine speed derived from the wheel speed and gear.
    pub fn rpm(&self) -> f64 {
        let ratio = f64::from(self.gear.abs().max(1));
        (800.0 + self.speed_x.abs() * 120.0 / ratio).min(10_000.0)
    }

    /// Distance to the track edge along each rangefinder beam.
    ///
    /// Off track every beam reads -1, as the real server reports.
    pub fn rangefinders(&self) -> Vec<f64> {
        if self.is_off_track() {
            return vec![-1.0; rangefinder_angles().len()];
        }

        let half = TRACK_WIDTH / 2.0;
        let to_left = (1.0 - self.track_pos) * half;
        let to_right = (1.0 + self.track_pos) * half;

        rangefinder_angles()
            .iter()
            .map(|beam| {
                let lateral = (self.angle - beam.to_radians()).sin();
                let edge = if lateral > 0.0 { to_left } else { to_right };
                if lateral.abs() < 1e-3 {
                    RANGEFINDER_RANGE
                } else {
                    (edge / lateral.abs()).min(RANGEFINDER_RANGE)
                }
            })
            .collect()
    }

    /// Sensor payload for the current state.
    pub fn sensors(&self) -> WireMessage {
        let wheel = self.speed_x / 3.6 / WHEEL_RADIUS;
        WireMessage::new()
            .with_value("angle", self.angle)
            .with_value("curLapTime", self.cur_lap_time)
            .with_value("damage", self.damage)
            .with_value("distFromStart", self.dist_raced.rem_euclid(TRACK_LENGTH))
            .with_value("distRaced", self.dist_raced)
            .with_value("fuel", self.fuel)
            .with_value("gear", f64::from(self.gear))
            .with_value("lastLapTime", self.last_lap_time)
            .with("opponents", vec![RANGEFINDER_RANGE; OPPONENT_SECTORS])
            .with_value("racePos", 1.0)
            .with_value("rpm", self.rpm())
            .with_value("speedX", self.speed_x)
            .with_value("speedY", 0.0)
            .with_value("speedZ", 0.0)
            .with("track", self.rangefinders())
            .with_value("trackPos", self.track_pos)
            .with("wheelSpinVel", vec![wheel; 4])
            .with_value("z", 0.34)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use scrc_core::SensorSnapshot;

    fn throttle(accel: f64, gear: i32) -> ControlSnapshot {
        ControlSnapshot {
            accel,
            gear,
            ..ControlSnapshot::default()
        }
    }

    #[test]
    fn test_neutral_gear_does_not_move() {
        let mut car = SimCar::new();
        for _ in 0..50 {
            car.step(&throttle(1.0, 0));
        }
        assert_eq!(car.speed_x, 0.0);
    }

    #[test]
    fn test_accelerates_and_brakes_to_rest() {
        let mut car = SimCar::new();
        for _ in 0..100 {
            car.step(&throttle(1.0, 1));
        }
        assert!(car.speed_x > 50.0);
        assert!(car.dist_raced > 0.0);

        let brake = ControlSnapshot {
            brake: 1.0,
            gear: 1,
            ..ControlSnapshot::default()
        };
        for _ in 0..500 {
            car.step(&brake);
        }
        assert_eq!(car.speed_x, 0.0);
    }

    #[test]
    fn test_reverse_gear_goes_backwards() {
        let mut car = SimCar::new();
        for _ in 0..10 {
            car.step(&throttle(1.0, -1));
        }
        assert!(car.speed_x < 0.0);
    }

    #[test]
    fn test_centred_rangefinders() {
        let car = SimCar::new();
        let track = car.rangefinders();
        assert_eq!(track.len(), 19);

        // Straight ahead never meets an edge
        assert_eq!(track[9], RANGEFINDER_RANGE);
        // Perpendicular beams hit the edges at half the width
        assert_relative_eq!(track[0], TRACK_WIDTH / 2.0, epsilon = 1e-9);
        assert_relative_eq!(track[18], TRACK_WIDTH / 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_off_track_readings() {
        let car = SimCar {
            track_pos: 1.5,
            ..SimCar::default()
        };
        assert!(car.rangefinders().iter().all(|&d| d == -1.0));
    }

    #[test]
    fn test_sensor_payload_is_complete() {
        let mut car = SimCar::new();
        car.step(&throttle(0.5, 2));
        let sensors = SensorSnapshot::new(car.sensors());

        assert_eq!(sensors.gear(), Some(2));
        assert_eq!(sensors.race_pos(), Some(1));
        assert_eq!(sensors.track().map(<[f64]>::len), Some(19));
        assert_eq!(sensors.opponents().map(<[f64]>::len), Some(36));
        assert_eq!(sensors.wheel_spin_vel().map(<[f64]>::len), Some(4));
        assert_relative_eq!(sensors.cur_lap_time().unwrap(), TICK_SECS);
    }
}
