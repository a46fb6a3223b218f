//! Scenario runner - drives a real session against the simulated server.

use crate::scenarios::ScenarioId;
use crate::server::{ServerStats, SimServer};

use scrc_core::protocol::END_OF_EPISODE;
use scrc_core::{
    decode, ControlSnapshot, ControlSurface, ManualDriver, Phase, SensorSnapshot, Session,
    SessionMachine, SessionSummary, SharedInput,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

const CONTROL_TAGS: [&str; 7] = ["accel", "brake", "gear", "steer", "clutch", "focus", "meta"];

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub scenario: ScenarioId,
    pub seed: u64,

    /// Whether every invariant held
    pub passed: bool,

    /// Broken invariants, joined
    pub failure_reason: Option<String>,

    /// Session report, absent if the session returned an error
    pub summary: Option<SessionSummary>,

    pub server: ServerStats,

    /// Notifications delivered to the control surface
    pub shutdowns_notified: u32,
    pub restarts_notified: u32,
}

/// Control surface used by the harness: a manual driver with the pedal
/// held down, counting the server notifications it receives.
pub struct HarnessDriver {
    driver: ManualDriver,
    input: SharedInput,
    shutdowns: u32,
    restarts: u32,
}

impl HarnessDriver {
    pub fn new() -> Self {
        let input = SharedInput::new();
        let driver = ManualDriver::new(input.clone());
        let harness = Self {
            driver,
            input,
            shutdowns: 0,
            restarts: 0,
        };
        harness.press();
        harness
    }

    fn press(&self) {
        self.input.set_throttle(0.6);
        self.input.set_steer(0.05);
    }
}

impl Default for HarnessDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlSurface for HarnessDriver {
    fn on_sensor_snapshot(&mut self, sensors: &SensorSnapshot) -> ControlSnapshot {
        self.driver.on_sensor_snapshot(sensors)
    }

    fn on_shutdown(&mut self) {
        self.shutdowns += 1;
        self.driver.on_shutdown();
    }

    fn on_restart(&mut self) {
        self.restarts += 1;
        self.driver.on_restart();
        // The manual driver releases the pedals on restart
        self.press();
    }
}

/// Runs scenarios against a fresh server per run.
pub struct ScenarioRunner {
    seed: u64,
    bot_id: String,
}

impl ScenarioRunner {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            bot_id: "SCR".to_string(),
        }
    }

    pub fn with_bot_id(mut self, bot_id: impl Into<String>) -> Self {
        self.bot_id = bot_id.into();
        self
    }

    /// Runs a scenario and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());

        let server = Arc::new(SimServer::new(scenario.server_config(self.seed)));
        let machine = SessionMachine::new(scenario.session_config(&self.bot_id), HarnessDriver::new());
        let mut session = Session::new(server.clone(), machine);

        let outcome = session.run().await;
        let (_, machine) = session.into_parts();
        let identification = machine.identification().to_string();
        let phase = machine.phase();
        let driver = machine.into_surface();

        let mut failures = Vec::new();
        let summary = match outcome {
            Ok(summary) => Some(summary),
            Err(e) => {
                failures.push(format!("session failed: {}", e));
                None
            }
        };

        let server_stats = server.stats();
        let received = server.received();

        if phase != Phase::ShuttingDown {
            failures.push(format!("session ended in phase {}", phase));
        }
        check_payloads(&received, &identification, &mut failures);

        if let Some(summary) = &summary {
            let stats = &summary.stats;
            let sent_identifications = received.iter().filter(|p| **p == identification).count() as u64;

            expect_eq(&mut failures, "identification requests", stats.identification_requests, sent_identifications);
            expect_eq(&mut failures, "server-seen identifications", server_stats.identification_requests, sent_identifications);
            expect_eq(&mut failures, "controls", server_stats.controls_received, stats.control_sends);
            expect_eq(&mut failures, "end-of-episode directives", server_stats.end_of_episode_requests, stats.episode_directives);
            expect_eq(&mut failures, "skipped payloads", stats.decode_failures, server_stats.garbage_payloads);
            expect_eq(&mut failures, "restarts", stats.restarts, server_stats.restarts_sent);
            expect_eq(&mut failures, "restart notifications", u64::from(driver.restarts), stats.restarts);
            expect_eq(&mut failures, "shutdown notifications", u64::from(driver.shutdowns), server_stats.shutdowns_sent);
            expect_eq(&mut failures, "payloads after shutdown", server_stats.unexpected_payloads, 0);

            self.check_scenario(scenario, summary, &server_stats, &mut failures);
        }

        let passed = failures.is_empty();
        for failure in &failures {
            debug!("  {} (seed={}): {}", scenario.name(), self.seed, failure);
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            failure_reason: (!passed).then(|| failures.join("; ")),
            summary,
            server: server_stats,
            shutdowns_notified: driver.shutdowns,
            restarts_notified: driver.restarts,
        }
    }

    /// Runs every scenario in order.
    pub async fn run_all(&self) -> Vec<ScenarioResult> {
        let mut results = Vec::with_capacity(ScenarioId::all().len());
        for scenario in ScenarioId::all() {
            results.push(self.run(*scenario).await);
        }
        results
    }

    fn check_scenario(
        &self,
        scenario: ScenarioId,
        summary: &SessionSummary,
        server: &ServerStats,
        failures: &mut Vec<String>,
    ) {
        let stats = &summary.stats;
        match scenario {
            ScenarioId::Handshake => {
                expect_eq(failures, "acknowledged identifications", stats.identification_requests.saturating_sub(server.acks_dropped), 1);
                expect_eq(failures, "controls", stats.control_sends, 5);
            }
            ScenarioId::StepBudget => {
                expect_eq(failures, "controls", stats.control_sends, 5);
                expect_eq(failures, "end-of-episode directives", stats.episode_directives, 1);
                expect_eq(failures, "episode controls", server.episode_controls.clone(), vec![5]);
            }
            ScenarioId::MultiEpisode => {
                expect_eq(failures, "episodes", summary.state.episode, 3);
                expect_eq(failures, "identification requests", stats.identification_requests, 3);
                expect_eq(failures, "episode controls", server.episode_controls.clone(), vec![8, 8, 8]);
                expect_eq(failures, "shutdowns sent", server.shutdowns_sent, 0);
            }
            ScenarioId::Shutdown => {
                expect_eq(failures, "shutdowns sent", server.shutdowns_sent, 1);
                expect_eq(failures, "end-of-episode directives", stats.episode_directives, 0);
                if stats.control_sends > 12 {
                    failures.push(format!("{} controls in a 12-tick race", stats.control_sends));
                }
            }
            ScenarioId::Garbage => {
                expect_eq(failures, "controls", stats.control_sends, 10);
                expect_eq(failures, "end-of-episode directives", stats.episode_directives, 1);
            }
        }
    }
}

/// Every client payload must be the identification request, the
/// end-of-episode directive, or a complete control message.
fn check_payloads(received: &[String], identification: &str, failures: &mut Vec<String>) {
    for payload in received {
        if payload == identification || payload == END_OF_EPISODE {
            continue;
        }
        match decode(payload) {
            Ok(message) if CONTROL_TAGS.iter().all(|tag| message.first(tag).is_some()) => {}
            Ok(_) => failures.push(format!("incomplete control payload: {}", payload)),
            Err(e) => failures.push(format!("undecodable client payload '{}': {}", payload, e)),
        }
    }
}

fn expect_eq<T: PartialEq + std::fmt::Debug>(failures: &mut Vec<String>, what: &str, actual: T, expected: T) {
    if actual != expected {
        failures.push(format!("{}: expected {:?}, got {:?}", what, expected, actual));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_all_scenarios_pass() {
        for result in ScenarioRunner::new(42).run_all().await {
            assert!(result.passed, "{}: {:?}", result.scenario, result.failure_reason);
        }
    }

    #[tokio::test]
    async fn test_step_budget_deterministic() {
        let a = ScenarioRunner::new(7).run(ScenarioId::StepBudget).await;
        let b = ScenarioRunner::new(7).run(ScenarioId::StepBudget).await;
        assert_eq!(a.server, b.server);
        assert_eq!(a.summary, b.summary);
    }

    #[tokio::test]
    async fn test_handshake_retries() {
        let result = ScenarioRunner::new(3).run(ScenarioId::Handshake).await;
        assert!(result.passed, "{:?}", result.failure_reason);

        let summary = result.summary.unwrap();
        assert_eq!(summary.stats.identification_requests, result.server.acks_dropped + 1);
        assert_eq!(result.shutdowns_notified, 1);
    }

    #[tokio::test]
    async fn test_multi_episode_notifies_restarts() {
        let result = ScenarioRunner::new(11).run(ScenarioId::MultiEpisode).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.restarts_notified, 3);
        assert_eq!(result.shutdowns_notified, 0);
    }

    #[test]
    fn test_bad_payload_flagged() {
        let mut failures = Vec::new();
        check_payloads(
            &["SCR(init 0)".to_string(), "(accel 1)".to_string(), "(meta".to_string()],
            "SCR(init 0)",
            &mut failures,
        );
        assert_eq!(failures.len(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_scenarios_hold_for_any_seed(seed in any::<u64>()) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let results = runtime.block_on(ScenarioRunner::new(seed).run_all());
            for result in results {
                prop_assert!(result.passed, "{} seed {}: {:?}", result.scenario, seed, result.failure_reason);
            }
        }
    }
}
