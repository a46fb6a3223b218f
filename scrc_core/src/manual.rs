//! Manual control surface fed by an independent input producer.
//!
//! The producer (a keyboard thread in `scrc-client`) writes into a
//! [`SharedInput`] whenever an input event arrives. The session never waits
//! on it: each tick [`ManualDriver`] reads whatever was last committed.
//!
//! ```text
//! keyboard thread ──commit──► SharedInput ◄──latest── ManualDriver (session tick)
//! ```

use crate::control::{ControlSnapshot, ControlSurface};
use crate::sensors::SensorSnapshot;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lowest selectable gear (reverse)
pub const MIN_GEAR: i32 = -1;

/// Highest selectable gear
pub const MAX_GEAR: i32 = 6;

/// Gear engaged at the start of every episode
pub const START_GEAR: i32 = 1;

/// Latest operator intent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManualInput {
    /// Steering request, -1..1
    pub steer: f64,

    /// Positive values accelerate, negative values brake
    pub throttle: f64,

    /// Gear shifts requested since the last tick
    pub pending_shift: i32,
}

/// Input buffer shared between the producer thread and the session.
#[derive(Debug, Clone, Default)]
pub struct SharedInput {
    inner: Arc<Mutex<ManualInput>>,
}

impl SharedInput {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking producer leaves a consistent value behind; keep using it.
    fn lock(&self) -> MutexGuard<'_, ManualInput> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_steer(&self, steer: f64) {
        self.lock().steer = steer.clamp(-1.0, 1.0);
    }

    pub fn set_throttle(&self, throttle: f64) {
        self.lock().throttle = throttle.clamp(-1.0, 1.0);
    }

    /// Queues a gear change relative to the gear reported by the car.
    pub fn shift(&self, delta: i32) {
        self.lock().pending_shift += delta;
    }

    /// Returns steering and throttle to neutral.
    pub fn release(&self) {
        let mut input = self.lock();
        input.steer = 0.0;
        input.throttle = 0.0;
    }

    /// Returns a copy of the latest committed input.
    pub fn latest(&self) -> ManualInput {
        *self.lock()
    }

    /// Returns the latest input and clears the queued gear shifts.
    pub fn take(&self) -> ManualInput {
        let mut input = self.lock();
        let snapshot = *input;
        input.pending_shift = 0;
        snapshot
    }
}

/// Control surface that forwards the operator's latest input.
pub struct ManualDriver {
    input: SharedInput,

    /// Gear held by this driver
    gear: i32,
}

impl ManualDriver {
    pub fn new(input: SharedInput) -> Self {
        Self { input, gear: START_GEAR }
    }

    /// Returns the input buffer for handing to a producer.
    pub fn input(&self) -> SharedInput {
        self.input.clone()
    }
}

impl ControlSurface for ManualDriver {
    fn on_sensor_snapshot(&mut self, sensors: &SensorSnapshot) -> ControlSnapshot {
        let input = self.input.take();

        if input.pending_shift != 0 {
            let current = sensors.gear().unwrap_or(self.gear);
            self.gear = (current + input.pending_shift).clamp(MIN_GEAR, MAX_GEAR);
        }

        let (accel, brake) = if input.throttle > 0.0 {
            (input.throttle, 0.0)
        } else if input.throttle < 0.0 {
            (0.0, -input.throttle)
        } else {
            (0.0, 0.0)
        };

        ControlSnapshot {
            accel,
            brake,
            gear: self.gear,
            steer: input.steer,
            ..ControlSnapshot::default()
        }
    }

    fn on_restart(&mut self) {
        self.gear = START_GEAR;
        self.input.release();
    }
}
