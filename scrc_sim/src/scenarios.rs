//! Scenario definitions for the simulation harness.
//!
//! Each scenario pairs a server fault profile with a session configuration.
//! The runner checks the invariants every run must hold plus the ones
//! specific to the scenario.

use crate::server::ServerConfig;
use scrc_core::SessionConfig;
use serde::Serialize;

/// Scenario identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// Lost acknowledgements, identification must be retried verbatim
    Handshake,

    /// Client-side step budget ends the episode with `(meta 1)`
    StepBudget,

    /// Server restarts episodes until the client's episode budget runs out
    MultiEpisode,

    /// Server shuts the race down mid-episode
    Shutdown,

    /// Malformed sensor payloads are skipped without a reply
    Garbage,
}

impl ScenarioId {
    /// Returns all scenarios.
    pub fn all() -> &'static [ScenarioId] {
        &[
            ScenarioId::Handshake,
            ScenarioId::StepBudget,
            ScenarioId::MultiEpisode,
            ScenarioId::Shutdown,
            ScenarioId::Garbage,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Handshake => "handshake",
            ScenarioId::StepBudget => "step_budget",
            ScenarioId::MultiEpisode => "multi_episode",
            ScenarioId::Shutdown => "shutdown",
            ScenarioId::Garbage => "garbage",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Handshake => "60% of identification acks lost, 5-tick race",
            ScenarioId::StepBudget => "5-step budget with 20% sensor loss",
            ScenarioId::MultiEpisode => "server restarts every 8 ticks, client stops after 3 episodes",
            ScenarioId::Shutdown => "server shuts down after 12 ticks with 25% sensor loss",
            ScenarioId::Garbage => "30% malformed sensor payloads, 10-step budget",
        }
    }

    /// Server fault profile for a run with `seed`.
    pub fn server_config(&self, seed: u64) -> ServerConfig {
        let config = ServerConfig::new(seed);
        match self {
            ScenarioId::Handshake => config.with_ack_loss(0.6).with_episode_ticks(5),
            ScenarioId::StepBudget => config.with_sensor_loss(0.2),
            ScenarioId::MultiEpisode => config.with_episode_ticks(8).with_shutdown_after(0),
            ScenarioId::Shutdown => config.with_sensor_loss(0.25).with_episode_ticks(12),
            ScenarioId::Garbage => config.with_garbage_rate(0.3),
        }
    }

    /// Session configuration for the client under test.
    pub fn session_config(&self, bot_id: &str) -> SessionConfig {
        let config = SessionConfig::new(bot_id);
        match self {
            ScenarioId::Handshake | ScenarioId::Shutdown => config,
            ScenarioId::StepBudget => config.with_max_steps(5),
            ScenarioId::MultiEpisode => config.with_max_episodes(3),
            ScenarioId::Garbage => config.with_max_steps(10),
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "handshake" => Ok(ScenarioId::Handshake),
            "step_budget" | "stepbudget" => Ok(ScenarioId::StepBudget),
            "multi_episode" | "multiepisode" => Ok(ScenarioId::MultiEpisode),
            "shutdown" => Ok(ScenarioId::Shutdown),
            "garbage" => Ok(ScenarioId::Garbage),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(*scenario));
        }
        assert_eq!("StepBudget".parse::<ScenarioId>(), Ok(ScenarioId::StepBudget));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_budgets() {
        assert_eq!(ScenarioId::StepBudget.session_config("bot").max_steps, 5);
        assert_eq!(ScenarioId::MultiEpisode.session_config("bot").max_episodes, 3);
        assert_eq!(ScenarioId::MultiEpisode.server_config(0).shutdown_after, 0);
    }
}
