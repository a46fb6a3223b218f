//! Session Runtime - Connection lifecycle against the race server.
//!
//! The session is split in two layers:
//!
//! - [`SessionMachine`] is "Sans-IO": it consumes [`Received`] outcomes and
//!   returns the payload to send next, if any. All protocol decisions live
//!   here, so it can be driven by hand in tests.
//! - [`Session`] owns a [`DatagramTransport`] and pumps the machine until it
//!   reaches [`Phase::ShuttingDown`].
//!
//! # Phases
//!
//! ```text
//!   ┌────────────┐ ***identified*** ┌────────────┐ immediate ┌─────────┐
//!   │ Connecting │─────────────────►│ Identified │──────────►│ Driving │◄─┐ sensor
//!   └────────────┘                  └────────────┘           └─────────┘──┘ payload
//!     ▲   │  ▲ timeout / other payload:                        │     │
//!     │   └──┘ resend identification            step budget    │     │
//!     │                                                        ▼     │
//!     │ ***restart***                             ┌──────────────┐   │
//!     └───────────────────────────────────────────│ EpisodeEnded │   │
//!       (also from Driving)                       └──────────────┘   │
//!                                                        │           │
//!            ***shutdown*** / episode budget spent       ▼           ▼
//!                                                 ┌──────────────────────┐
//!                                                 │     ShuttingDown     │
//!                                                 └──────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use scrc_core::{ManualDriver, Session, SessionConfig, SessionMachine, SharedInput};
//! use scrc_env::{TransportConfig, UdpTransport};
//!
//! let transport = UdpTransport::connect(TransportConfig::default()).await?;
//! let machine = SessionMachine::new(SessionConfig::default(), ManualDriver::new(SharedInput::new()));
//! let summary = Session::new(transport, machine).run().await?;
//! ```

use crate::codec::{decode, encode};
use crate::config::SessionConfig;
use crate::control::ControlSurface;
use crate::error::SessionError;
use crate::observer::{SessionObserver, TickRecord};
use crate::protocol::{
    identification_request, is_identified, rangefinder_angles, ServerSignal, END_OF_EPISODE,
    RANGEFINDER_COUNT,
};
use crate::sensors::SensorSnapshot;

use scrc_env::{DatagramTransport, Received};
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};

// =============================================================================
// STATE
// =============================================================================

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    Connecting,
    Identified,
    Driving,
    EpisodeEnded,
    ShuttingDown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Connecting => "connecting",
            Phase::Identified => "identified",
            Phase::Driving => "driving",
            Phase::EpisodeEnded => "episode-ended",
            Phase::ShuttingDown => "shutting-down",
        };
        f.write_str(name)
    }
}

/// Counters and budgets of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub phase: Phase,

    /// Control payloads sent in the current episode
    pub step: u32,

    /// Episodes finished so far
    pub episode: u32,

    /// Step budget (0 = unbounded)
    pub max_steps: u32,

    /// Episode budget (0 = unbounded)
    pub max_episodes: u32,
}

/// Cumulative session statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Identification requests sent (including retries)
    pub identification_requests: u64,

    /// Control payloads sent across all episodes
    pub control_sends: u64,

    /// End-of-episode directives sent
    pub episode_directives: u64,

    /// Receive windows that closed without a payload
    pub timeouts: u64,

    /// Sensor payloads dropped because they failed to decode
    pub decode_failures: u64,

    /// Restart tokens observed
    pub restarts: u64,
}

/// Final report of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub state: SessionState,
    pub stats: SessionStats,
}

// =============================================================================
// STATE MACHINE
// =============================================================================

/// Protocol state machine, independent of any socket.
pub struct SessionMachine<S: ControlSurface> {
    config: SessionConfig,

    state: SessionState,

    stats: SessionStats,

    /// Identification payload, built once from the rangefinder layout
    identification: String,

    /// Identification requests sent in the current connecting phase
    identify_attempts: u32,

    surface: S,

    observers: Vec<Box<dyn SessionObserver>>,
}

impl<S: ControlSurface> SessionMachine<S> {
    /// Creates a machine in [`Phase::Connecting`].
    pub fn new(config: SessionConfig, surface: S) -> Self {
        let angles: [f64; RANGEFINDER_COUNT] = rangefinder_angles();
        let identification = identification_request(&config.bot_id, &angles);

        let state = SessionState {
            phase: Phase::Connecting,
            step: 0,
            episode: 0,
            max_steps: config.max_steps,
            max_episodes: config.max_episodes,
        };

        Self {
            config,
            state,
            stats: SessionStats::default(),
            identification,
            identify_attempts: 0,
            surface,
            observers: Vec::new(),
        }
    }

    /// Attaches an observer.
    pub fn with_observer(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn add_observer(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            state: self.state,
            stats: self.stats,
        }
    }

    /// The identification payload sent on every connecting attempt.
    pub fn identification(&self) -> &str {
        &self.identification
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Returns the first payload to send (the identification request while
    /// connecting).
    pub fn start(&mut self) -> Result<Option<String>, SessionError> {
        match self.state.phase {
            Phase::Connecting => self.next_identification().map(Some),
            _ => Ok(None),
        }
    }

    /// Feeds one receive outcome and returns the payload to send in reply.
    pub fn on_received(&mut self, received: Received) -> Result<Option<String>, SessionError> {
        if received == Received::Timeout {
            self.stats.timeouts += 1;
        }

        match self.state.phase {
            Phase::Connecting => self.on_connecting(received),
            Phase::Driving | Phase::EpisodeEnded => match received {
                Received::Datagram(payload) => self.on_drive_payload(&payload),
                Received::Timeout => {
                    debug!("No sensor payload within the receive window");
                    Ok(None)
                }
            },
            // Identified never outlives a single call
            Phase::Identified | Phase::ShuttingDown => Ok(None),
        }
    }

    /// Forces the session down after a fatal transport failure.
    pub fn abort(&mut self) {
        if self.state.phase != Phase::ShuttingDown {
            self.transition(Phase::ShuttingDown);
        }
    }

    fn on_connecting(&mut self, received: Received) -> Result<Option<String>, SessionError> {
        match received {
            Received::Datagram(payload) if is_identified(&payload) => {
                info!("Identified after {} attempt(s): {}", self.identify_attempts, payload.trim());
                self.identify_attempts = 0;
                self.transition(Phase::Identified);
                self.state.step = 0;
                self.transition(Phase::Driving);
                Ok(None)
            }
            Received::Datagram(payload) => {
                debug!("Waiting for identification, ignoring: {}", payload.trim());
                self.next_identification().map(Some)
            }
            Received::Timeout => {
                debug!("No identification acknowledgement, resending");
                self.next_identification().map(Some)
            }
        }
    }

    fn next_identification(&mut self) -> Result<String, SessionError> {
        if let Some(cap) = self.config.max_identify_attempts {
            if self.identify_attempts >= cap {
                error!("Giving up identification after {} attempts", self.identify_attempts);
                let attempts = self.identify_attempts;
                self.transition(Phase::ShuttingDown);
                return Err(SessionError::IdentificationExhausted { attempts });
            }
        }

        self.identify_attempts += 1;
        self.stats.identification_requests += 1;
        Ok(self.identification.clone())
    }

    fn on_drive_payload(&mut self, payload: &str) -> Result<Option<String>, SessionError> {
        if let Some(signal) = ServerSignal::detect(payload) {
            return self.on_signal(signal);
        }

        if self.state.phase == Phase::EpisodeEnded {
            debug!("Episode ended, waiting for the server: {}", payload.trim());
            return Ok(None);
        }

        let message = match decode(payload) {
            Ok(message) => message,
            Err(e) => {
                self.stats.decode_failures += 1;
                warn!(
                    "Skipping malformed sensor payload (episode {}, step {}): {}",
                    self.state.episode, self.state.step, e
                );
                return Ok(None);
            }
        };

        // A late acknowledgement or other bare text carries no sensor data
        if message.is_empty() {
            debug!("Ignoring payload without sensor groups: {}", payload.trim());
            return Ok(None);
        }

        if self.state.max_steps > 0 && self.state.step >= self.state.max_steps {
            info!(
                "Step budget of {} reached, ending episode {}",
                self.state.max_steps, self.state.episode
            );
            self.stats.episode_directives += 1;
            self.transition(Phase::EpisodeEnded);
            return Ok(Some(END_OF_EPISODE.to_string()));
        }

        let sensors = SensorSnapshot::new(message);
        let control = self.surface.on_sensor_snapshot(&sensors);
        self.state.step += 1;
        self.stats.control_sends += 1;

        let record = TickRecord {
            episode: self.state.episode,
            step: self.state.step,
            sensors: &sensors,
            control: &control,
        };
        for observer in self.observers.iter_mut() {
            observer.on_tick(&record);
        }

        Ok(Some(encode(&control.to_message())))
    }

    fn on_signal(&mut self, signal: ServerSignal) -> Result<Option<String>, SessionError> {
        match signal {
            ServerSignal::Shutdown => {
                info!("Client shutdown");
                self.surface.on_shutdown();
                self.transition(Phase::ShuttingDown);
                Ok(None)
            }
            ServerSignal::Restart => {
                info!("Client restart");
                self.surface.on_restart();
                self.stats.restarts += 1;
                self.state.step = 0;
                self.state.episode += 1;

                if self.state.max_episodes > 0 && self.state.episode >= self.state.max_episodes {
                    info!("Episode budget of {} spent", self.state.max_episodes);
                    self.transition(Phase::ShuttingDown);
                    return Ok(None);
                }

                self.identify_attempts = 0;
                self.transition(Phase::Connecting);
                self.next_identification().map(Some)
            }
        }
    }

    fn transition(&mut self, to: Phase) {
        let from = self.state.phase;
        debug!("Session phase {} -> {}", from, to);
        self.state.phase = to;
        for observer in self.observers.iter_mut() {
            observer.on_transition(from, to);
        }
    }
}

// =============================================================================
// DRIVER
// =============================================================================

/// Binds a [`SessionMachine`] to a transport and runs it to completion.
pub struct Session<T: DatagramTransport, S: ControlSurface> {
    transport: T,
    machine: SessionMachine<S>,
}

impl<T: DatagramTransport, S: ControlSurface> Session<T, S> {
    pub fn new(transport: T, machine: SessionMachine<S>) -> Self {
        Self { transport, machine }
    }

    pub fn machine(&self) -> &SessionMachine<S> {
        &self.machine
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_parts(self) -> (T, SessionMachine<S>) {
        (self.transport, self.machine)
    }

    /// Runs until the machine reaches [`Phase::ShuttingDown`].
    ///
    /// Only a failed send (or an exhausted identification cap) returns an
    /// error; receive failures are logged and treated as empty windows.
    pub async fn run(&mut self) -> Result<SessionSummary, SessionError> {
        let config = self.machine.config();
        info!(
            "Connecting to {} as '{}' (stage: {}, track: {})",
            self.transport.peer(),
            config.bot_id,
            config.stage,
            config.track.as_deref().unwrap_or("-")
        );

        let mut outgoing = self.machine.start()?;

        loop {
            if let Some(payload) = outgoing.take() {
                if let Err(e) = self.transport.send(&payload).await {
                    error!("Failed to send data: {}", e);
                    self.machine.abort();
                    return Err(SessionError::Transport(e));
                }
            }

            if self.machine.phase() == Phase::ShuttingDown {
                break;
            }

            let received = match self.transport.recv().await {
                Ok(received) => received,
                Err(e) => {
                    warn!("Didn't get response from server: {}", e);
                    Received::Timeout
                }
            };
            outgoing = self.machine.on_received(received)?;
        }

        let summary = self.machine.summary();
        info!(
            "Session finished after {} episode(s), {} control message(s)",
            summary.state.episode, summary.stats.control_sends
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlSnapshot;
    use crate::protocol::{IDENTIFIED_TOKEN, RESTART_TOKEN, SHUTDOWN_TOKEN};
    use async_trait::async_trait;
    use scrc_env::TransportError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    const SENSORS: &str = "(angle 0)(gear 1)(speedX 30)(trackPos 0.5)";

    /// Surface that records calls and returns a fixed throttle.
    #[derive(Default)]
    struct Recorder {
        ticks: u32,
        shutdowns: u32,
        restarts: u32,
    }

    impl ControlSurface for Recorder {
        fn on_sensor_snapshot(&mut self, _sensors: &SensorSnapshot) -> ControlSnapshot {
            self.ticks += 1;
            ControlSnapshot {
                accel: 1.0,
                gear: 1,
                ..ControlSnapshot::default()
            }
        }

        fn on_shutdown(&mut self) {
            self.shutdowns += 1;
        }

        fn on_restart(&mut self) {
            self.restarts += 1;
        }
    }

    #[derive(Clone, Default)]
    struct Transitions(Arc<Mutex<Vec<(Phase, Phase)>>>);

    impl SessionObserver for Transitions {
        fn on_tick(&mut self, _record: &TickRecord<'_>) {}

        fn on_transition(&mut self, from: Phase, to: Phase) {
            self.0.lock().unwrap().push((from, to));
        }
    }

    fn datagram(text: &str) -> Received {
        Received::Datagram(text.to_string())
    }

    fn machine(config: SessionConfig) -> SessionMachine<Recorder> {
        SessionMachine::new(config, Recorder::default())
    }

    fn driving(config: SessionConfig) -> SessionMachine<Recorder> {
        let mut m = machine(config);
        m.start().unwrap();
        m.on_received(datagram(IDENTIFIED_TOKEN)).unwrap();
        assert_eq!(m.phase(), Phase::Driving);
        m
    }

    #[test]
    fn test_start_sends_identification() {
        let mut m = machine(SessionConfig::new("bot7"));
        let first = m.start().unwrap().unwrap();
        assert!(first.starts_with("bot7(init -90 -75"));
        assert_eq!(first, m.identification());
    }

    #[test]
    fn test_timeouts_resend_identical_identification() {
        let mut m = machine(SessionConfig::default());
        let first = m.start().unwrap().unwrap();

        for _ in 0..25 {
            let resend = m.on_received(Received::Timeout).unwrap();
            assert_eq!(resend.as_deref(), Some(first.as_str()));
            assert_eq!(m.phase(), Phase::Connecting);
        }
        assert_eq!(m.stats().identification_requests, 26);
        assert_eq!(m.stats().timeouts, 25);
    }

    #[test]
    fn test_unrelated_payload_while_connecting_resends() {
        let mut m = machine(SessionConfig::default());
        let first = m.start().unwrap().unwrap();
        let resend = m.on_received(datagram("(speedX 3)")).unwrap();
        assert_eq!(resend, Some(first));
        assert_eq!(m.phase(), Phase::Connecting);
    }

    #[test]
    fn test_identified_goes_through_identified_to_driving() {
        let transitions = Transitions::default();
        let mut m = machine(SessionConfig::default()).with_observer(transitions.clone());
        m.start().unwrap();

        let reply = m.on_received(datagram("***identified***")).unwrap();
        assert_eq!(reply, None);
        assert_eq!(m.phase(), Phase::Driving);
        assert_eq!(
            *transitions.0.lock().unwrap(),
            vec![
                (Phase::Connecting, Phase::Identified),
                (Phase::Identified, Phase::Driving)
            ]
        );
    }

    #[test]
    fn test_drive_tick_sends_controls() {
        let mut m = driving(SessionConfig::default());
        let reply = m.on_received(datagram(SENSORS)).unwrap().unwrap();
        assert_eq!(
            reply,
            "(accel 1)(brake 0)(gear 1)(steer 0)(clutch 0)(focus 0)(meta 0)"
        );
        assert_eq!(m.state().step, 1);
        assert_eq!(m.surface().ticks, 1);
    }

    #[test]
    fn test_shutdown_notifies_once() {
        let mut m = driving(SessionConfig::default());
        assert_eq!(m.on_received(datagram(SHUTDOWN_TOKEN)).unwrap(), None);
        assert_eq!(m.phase(), Phase::ShuttingDown);

        // Nothing happens once shut down
        assert_eq!(m.on_received(datagram(SHUTDOWN_TOKEN)).unwrap(), None);
        assert_eq!(m.surface().shutdowns, 1);
    }

    #[test]
    fn test_shutdown_takes_precedence_over_restart() {
        let mut m = driving(SessionConfig::default());
        m.on_received(datagram("***restart***(x 1)***shutdown***")).unwrap();
        assert_eq!(m.phase(), Phase::ShuttingDown);
        assert_eq!(m.surface().shutdowns, 1);
        assert_eq!(m.surface().restarts, 0);
    }

    #[test]
    fn test_step_budget_two() {
        let mut m = driving(SessionConfig::default().with_max_steps(2));

        let tick1 = m.on_received(datagram(SENSORS)).unwrap().unwrap();
        let tick2 = m.on_received(datagram(SENSORS)).unwrap().unwrap();
        assert!(tick1.starts_with("(accel"));
        assert!(tick2.starts_with("(accel"));

        let tick3 = m.on_received(datagram(SENSORS)).unwrap();
        assert_eq!(tick3.as_deref(), Some(END_OF_EPISODE));
        assert_eq!(m.phase(), Phase::EpisodeEnded);

        // No further control messages this episode
        assert_eq!(m.on_received(datagram(SENSORS)).unwrap(), None);
        assert_eq!(m.surface().ticks, 2);
        assert_eq!(m.stats().episode_directives, 1);
    }

    #[test]
    fn test_decode_failures_do_not_count_toward_budget() {
        let mut m = driving(SessionConfig::default().with_max_steps(3));
        let mut controls = 0;
        let feed = [SENSORS, "(speedX", SENSORS, "(gear one)", "(a (b))", SENSORS];

        for payload in feed {
            if let Some(reply) = m.on_received(datagram(payload)).unwrap() {
                assert_ne!(reply, END_OF_EPISODE);
                controls += 1;
            }
            assert_eq!(m.phase(), Phase::Driving);
        }
        assert_eq!(controls, 3);
        assert_eq!(m.stats().decode_failures, 3);

        let next = m.on_received(datagram(SENSORS)).unwrap();
        assert_eq!(next.as_deref(), Some(END_OF_EPISODE));
    }

    #[test]
    fn test_timeouts_while_driving_are_skipped() {
        let mut m = driving(SessionConfig::default());
        assert_eq!(m.on_received(Received::Timeout).unwrap(), None);
        assert_eq!(m.phase(), Phase::Driving);
        assert_eq!(m.state().step, 0);
    }

    #[test]
    fn test_restart_reidentifies() {
        let mut m = driving(SessionConfig::default().with_max_episodes(3));
        m.on_received(datagram(SENSORS)).unwrap();

        let reply = m.on_received(datagram(RESTART_TOKEN)).unwrap();
        assert_eq!(reply.as_deref(), Some(m.identification()));
        assert_eq!(m.phase(), Phase::Connecting);
        assert_eq!(m.state().step, 0);
        assert_eq!(m.state().episode, 1);
        assert_eq!(m.surface().restarts, 1);
    }

    #[test]
    fn test_restart_from_episode_ended() {
        let mut m = driving(SessionConfig::default().with_max_steps(1));
        m.on_received(datagram(SENSORS)).unwrap();
        m.on_received(datagram(SENSORS)).unwrap();
        assert_eq!(m.phase(), Phase::EpisodeEnded);

        m.on_received(datagram(RESTART_TOKEN)).unwrap();
        assert_eq!(m.phase(), Phase::Connecting);
    }

    #[test]
    fn test_episode_budget_shuts_down() {
        let mut m = driving(SessionConfig::default().with_max_episodes(1));
        let reply = m.on_received(datagram(RESTART_TOKEN)).unwrap();
        assert_eq!(reply, None);
        assert_eq!(m.phase(), Phase::ShuttingDown);
        assert_eq!(m.surface().restarts, 1);
    }

    #[test]
    fn test_identify_cap() {
        let mut m = machine(SessionConfig::default().with_identify_cap(3));
        m.start().unwrap();
        m.on_received(Received::Timeout).unwrap();
        m.on_received(Received::Timeout).unwrap();

        let result = m.on_received(Received::Timeout);
        assert!(matches!(
            result,
            Err(SessionError::IdentificationExhausted { attempts: 3 })
        ));
        assert_eq!(m.phase(), Phase::ShuttingDown);
    }

    #[test]
    fn test_stray_acknowledgement_does_not_spend_budget() {
        let mut m = driving(SessionConfig::default().with_max_steps(1));

        assert_eq!(m.on_received(datagram(IDENTIFIED_TOKEN)).unwrap(), None);
        assert_eq!(m.phase(), Phase::Driving);
        assert_eq!(m.state().step, 0);
        assert_eq!(m.stats().decode_failures, 0);

        let tick = m.on_received(datagram(SENSORS)).unwrap().unwrap();
        assert!(tick.starts_with("(accel"));
        let next = m.on_received(datagram(SENSORS)).unwrap();
        assert_eq!(next.as_deref(), Some(END_OF_EPISODE));
        assert_eq!(m.surface().ticks, 1);
    }

    #[test]
    fn test_restart_respects_zero_identify_cap() {
        let mut m = machine(SessionConfig::default().with_identify_cap(0));
        m.on_received(datagram(IDENTIFIED_TOKEN)).unwrap();
        assert_eq!(m.phase(), Phase::Driving);

        let result = m.on_received(datagram(RESTART_TOKEN));
        assert!(matches!(
            result,
            Err(SessionError::IdentificationExhausted { attempts: 0 })
        ));
        assert_eq!(m.phase(), Phase::ShuttingDown);
        assert_eq!(m.surface().restarts, 1);
    }

    // -------------------------------------------------------------------------
    // Driver
    // -------------------------------------------------------------------------

    /// Transport replaying a fixed script and recording what was sent.
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Received>>,
        sent: Mutex<Vec<String>>,
        fail_send_after: Option<usize>,
        /// Receive calls (zero based) that fail without consuming a reply.
        fail_recv_at: Vec<usize>,
        recv_calls: Mutex<usize>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Received>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                sent: Mutex::new(Vec::new()),
                fail_send_after: None,
                fail_recv_at: Vec::new(),
                recv_calls: Mutex::new(0),
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DatagramTransport for ScriptedTransport {
        async fn send(&self, payload: &str) -> Result<(), TransportError> {
            let mut sent = self.sent.lock().unwrap();
            if self.fail_send_after.is_some_and(|n| sent.len() >= n) {
                return Err(TransportError::send("network unreachable"));
            }
            sent.push(payload.to_string());
            Ok(())
        }

        async fn recv(&self) -> Result<Received, TransportError> {
            let call = {
                let mut calls = self.recv_calls.lock().unwrap();
                *calls += 1;
                *calls - 1
            };
            if self.fail_recv_at.contains(&call) {
                return Err(TransportError::recv("connection refused"));
            }

            Ok(self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Received::Datagram(SHUTDOWN_TOKEN.to_string())))
        }

        fn peer(&self) -> String {
            "script".to_string()
        }
    }

    #[tokio::test]
    async fn test_session_runs_full_exchange() {
        let transport = ScriptedTransport::new(vec![
            Received::Timeout,
            datagram(IDENTIFIED_TOKEN),
            datagram(SENSORS),
            datagram(SENSORS),
            datagram(SHUTDOWN_TOKEN),
        ]);
        let mut session = Session::new(transport, machine(SessionConfig::default()));

        let summary = session.run().await.unwrap();
        assert_eq!(summary.state.phase, Phase::ShuttingDown);
        assert_eq!(summary.stats.control_sends, 2);

        let sent = session.transport().sent();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0], sent[1]);
        assert!(sent[0].starts_with("SCR(init"));
        assert!(sent[2].starts_with("(accel 1)"));
        assert_eq!(session.machine().surface().shutdowns, 1);
    }

    #[tokio::test]
    async fn test_recv_errors_count_as_timeouts() {
        let mut transport = ScriptedTransport::new(vec![
            datagram(IDENTIFIED_TOKEN),
            datagram(SENSORS),
            datagram(SHUTDOWN_TOKEN),
        ]);
        // One failure while connecting, one while driving
        transport.fail_recv_at = vec![0, 3];
        let mut session = Session::new(transport, machine(SessionConfig::default()));

        let summary = session.run().await.unwrap();
        assert_eq!(summary.state.phase, Phase::ShuttingDown);
        assert_eq!(summary.state.step, 1);
        assert_eq!(summary.stats.timeouts, 2);
        assert_eq!(summary.stats.control_sends, 1);

        // Identification resent verbatim, nothing sent for the driving failure
        let sent = session.transport().sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], sent[1]);
        assert!(sent[0].starts_with("SCR(init"));
        assert!(sent[2].starts_with("(accel 1)"));
    }

    #[tokio::test]
    async fn test_session_send_failure_is_fatal() {
        let mut transport = ScriptedTransport::new(vec![datagram(IDENTIFIED_TOKEN), datagram(SENSORS)]);
        transport.fail_send_after = Some(1);
        let mut session = Session::new(transport, machine(SessionConfig::default()));

        let result = session.run().await;
        assert!(matches!(result, Err(SessionError::Transport(_))));
        assert_eq!(session.machine().phase(), Phase::ShuttingDown);
        assert_eq!(session.machine().surface().shutdowns, 0);
    }
}
