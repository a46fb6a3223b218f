//! Simulated race server with fault injection.
//!
//! [`SimServer`] implements [`DatagramTransport`] directly, so a session
//! talks to it exactly as it would to a UDP socket. Every decision the
//! server makes (dropping an acknowledgement, losing a sensor datagram,
//! mangling a payload) is drawn from a single seeded ChaCha stream, which
//! makes a run fully reproducible from its seed.
//!
//! The server is lock-step: a client send produces the replies queued for
//! the following receives. An empty queue reads as a timeout. While racing,
//! a timeout also advances the race by one tick, as the real server does
//! when a client misses its deadline.

use crate::car::SimCar;

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use scrc_core::protocol::{END_OF_EPISODE, IDENTIFIED_TOKEN, INIT_TAG, RESTART_TOKEN, SHUTDOWN_TOKEN};
use scrc_core::{decode, encode, ControlSnapshot};
use scrc_env::{DatagramTransport, Received, TransportError};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Malformed payloads injected in place of sensor data.
const GARBAGE: [&str; 4] = [
    "(speedX 12.5(gear 1)",
    "(rpm 4e3x)(gear 2)",
    "(angle 0.1",
    "(trackPos 0)()",
];

/// Fault and episode settings of a simulated server.
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    /// Seed for every random decision
    pub seed: u64,

    /// Probability that an identification acknowledgement is lost
    pub ack_loss: f64,

    /// Probability that a sensor datagram is lost
    pub sensor_loss: f64,

    /// Probability that a sensor datagram is replaced by a malformed payload
    pub garbage_rate: f64,

    /// Ticks after which the server ends an episode itself (0 = never)
    pub episode_ticks: u64,

    /// Finished episodes after which the server shuts down (0 = never)
    pub shutdown_after: u64,

    /// Receive calls after which the server shuts down unconditionally
    pub recv_limit: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            ack_loss: 0.0,
            sensor_loss: 0.0,
            garbage_rate: 0.0,
            episode_ticks: 0,
            shutdown_after: 1,
            recv_limit: 10_000,
        }
    }
}

impl ServerConfig {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    pub fn with_ack_loss(mut self, rate: f64) -> Self {
        self.ack_loss = rate;
        self
    }

    pub fn with_sensor_loss(mut self, rate: f64) -> Self {
        self.sensor_loss = rate;
        self
    }

    pub fn with_garbage_rate(mut self, rate: f64) -> Self {
        self.garbage_rate = rate;
        self
    }

    pub fn with_episode_ticks(mut self, ticks: u64) -> Self {
        self.episode_ticks = ticks;
        self
    }

    pub fn with_shutdown_after(mut self, episodes: u64) -> Self {
        self.shutdown_after = episodes;
        self
    }

    pub fn with_recv_limit(mut self, limit: u64) -> Self {
        self.recv_limit = limit;
        self
    }
}

/// Phase of the simulated race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RacePhase {
    AwaitingIdentification,
    Racing,
    Finished,
}

/// Counters kept by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    pub identification_requests: u64,
    pub acks_dropped: u64,
    pub sensor_payloads: u64,
    pub sensors_dropped: u64,
    pub garbage_payloads: u64,
    pub controls_received: u64,
    pub end_of_episode_requests: u64,
    pub unexpected_payloads: u64,
    pub restarts_sent: u64,
    pub shutdowns_sent: u64,

    /// Controls received per episode
    pub episode_controls: Vec<u64>,
}

struct ServerState {
    config: ServerConfig,
    rng: ChaCha8Rng,
    phase: RacePhase,
    car: SimCar,
    last_control: ControlSnapshot,
    ticks: u64,
    episodes: u64,
    outbox: VecDeque<String>,
    received: Vec<String>,
    recv_calls: u64,
    stats: ServerStats,
}

impl ServerState {
    fn on_payload(&mut self, payload: &str) {
        self.received.push(payload.to_string());

        match self.phase {
            RacePhase::AwaitingIdentification => self.on_identification(payload),
            RacePhase::Racing if payload.trim() == END_OF_EPISODE => {
                self.stats.end_of_episode_requests += 1;
                info!("Client ended episode {} after {} tick(s)", self.episodes, self.ticks);
                self.finish_episode();
            }
            RacePhase::Racing => self.on_control(payload),
            RacePhase::Finished => {
                self.stats.unexpected_payloads += 1;
                warn!("Payload after shutdown: {}", payload);
            }
        }
    }

    fn on_identification(&mut self, payload: &str) {
        if !payload.contains(&format!("({INIT_TAG}")) {
            self.stats.unexpected_payloads += 1;
            warn!("Expected identification, got: {}", payload);
            return;
        }

        self.stats.identification_requests += 1;
        if self.roll(self.config.ack_loss) {
            self.stats.acks_dropped += 1;
            debug!("Dropping identification acknowledgement");
            return;
        }

        self.outbox.push_back(IDENTIFIED_TOKEN.to_string());
        self.phase = RacePhase::Racing;
        self.car = SimCar::new();
        self.last_control = ControlSnapshot::default();
        self.ticks = 0;
        self.stats.episode_controls.push(0);
        self.emit_sensors();
    }

    fn on_control(&mut self, payload: &str) {
        let control = match decode(payload) {
            Ok(message) => ControlSnapshot::from_message(&message),
            Err(e) => {
                self.stats.unexpected_payloads += 1;
                warn!("Undecodable control payload '{}': {}", payload, e);
                return;
            }
        };

        self.stats.controls_received += 1;
        if let Some(count) = self.stats.episode_controls.last_mut() {
            *count += 1;
        }
        self.last_control = control;
        self.tick();
    }

    fn tick(&mut self) {
        self.car.step(&self.last_control);
        self.ticks += 1;

        if self.config.episode_ticks > 0 && self.ticks >= self.config.episode_ticks {
            info!("Episode {} over after {} tick(s)", self.episodes, self.ticks);
            self.finish_episode();
        } else {
            self.emit_sensors();
        }
    }

    fn finish_episode(&mut self) {
        self.episodes += 1;
        if self.config.shutdown_after > 0 && self.episodes >= self.config.shutdown_after {
            self.shut_down();
        } else {
            self.stats.restarts_sent += 1;
            self.outbox.push_back(RESTART_TOKEN.to_string());
            self.phase = RacePhase::AwaitingIdentification;
        }
    }

    fn shut_down(&mut self) {
        self.stats.shutdowns_sent += 1;
        self.outbox.push_back(SHUTDOWN_TOKEN.to_string());
        self.phase = RacePhase::Finished;
    }

    fn emit_sensors(&mut self) {
        self.stats.sensor_payloads += 1;
        if self.roll(self.config.sensor_loss) {
            self.stats.sensors_dropped += 1;
            debug!("Dropping sensor payload at tick {}", self.ticks);
            return;
        }

        if self.roll(self.config.garbage_rate) {
            self.stats.garbage_payloads += 1;
            let garbage = GARBAGE[self.rng.gen_range(0..GARBAGE.len())];
            debug!("Injecting malformed payload: {}", garbage);
            self.outbox.push_back(garbage.to_string());
            return;
        }

        self.outbox.push_back(encode(&self.car.sensors()));
    }

    fn roll(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability.clamp(0.0, 1.0))
    }

    fn next_reply(&mut self) -> Received {
        self.recv_calls += 1;
        if self.recv_calls > self.config.recv_limit && self.phase != RacePhase::Finished {
            warn!("Receive limit of {} reached, shutting down", self.config.recv_limit);
            self.outbox.clear();
            self.shut_down();
        }

        match self.outbox.pop_front() {
            Some(payload) => Received::Datagram(payload),
            None => {
                // The client missed its deadline; the race goes on
                if self.phase == RacePhase::Racing {
                    self.tick();
                }
                Received::Timeout
            }
        }
    }
}

/// In-process race server.
pub struct SimServer {
    state: Mutex<ServerState>,
}

impl SimServer {
    pub fn new(config: ServerConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            state: Mutex::new(ServerState {
                config,
                rng,
                phase: RacePhase::AwaitingIdentification,
                car: SimCar::new(),
                last_control: ControlSnapshot::default(),
                ticks: 0,
                episodes: 0,
                outbox: VecDeque::new(),
                received: Vec::new(),
                recv_calls: 0,
                stats: ServerStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> RacePhase {
        self.lock().phase
    }

    pub fn stats(&self) -> ServerStats {
        self.lock().stats.clone()
    }

    /// Episodes finished so far.
    pub fn episodes(&self) -> u64 {
        self.lock().episodes
    }

    /// Every payload received from the client, in order.
    pub fn received(&self) -> Vec<String> {
        self.lock().received.clone()
    }

    /// Current state of the simulated car.
    pub fn car(&self) -> SimCar {
        self.lock().car.clone()
    }
}

#[async_trait]
impl DatagramTransport for SimServer {
    async fn send(&self, payload: &str) -> Result<(), TransportError> {
        self.lock().on_payload(payload);
        Ok(())
    }

    async fn recv(&self) -> Result<Received, TransportError> {
        Ok(self.lock().next_reply())
    }

    fn peer(&self) -> String {
        format!("sim-server(seed={})", self.lock().config.seed)
    }
}
