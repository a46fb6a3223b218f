//! Passive hooks into the session.

use crate::control::ControlSnapshot;
use crate::sensors::SensorSnapshot;
use crate::session::Phase;

/// Immutable record of one completed drive tick.
#[derive(Debug, Clone, Copy)]
pub struct TickRecord<'a> {
    /// Episode index, starting at 0
    pub episode: u32,

    /// Step counter after this tick, starting at 1
    pub step: u32,

    pub sensors: &'a SensorSnapshot,

    pub control: &'a ControlSnapshot,
}

/// Side-effect hook invoked by the session.
///
/// Observers cannot influence the state machine; they only see values.
pub trait SessionObserver: Send {
    /// Called after each tick that produced a control payload.
    fn on_tick(&mut self, record: &TickRecord<'_>);

    /// Called on every phase change.
    fn on_transition(&mut self, _from: Phase, _to: Phase) {}
}
