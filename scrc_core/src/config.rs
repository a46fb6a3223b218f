//! Session configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Race stage announced to the client at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Stage {
    WarmUp,
    Qualifying,
    Race,
    #[default]
    Unknown,
}

impl Stage {
    /// Maps the numeric stage code used on the command line.
    ///
    /// Codes outside 0..=2 are `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Stage::WarmUp,
            1 => Stage::Qualifying,
            2 => Stage::Race,
            _ => Stage::Unknown,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Stage::WarmUp => 0,
            Stage::Qualifying => 1,
            Stage::Race => 2,
            Stage::Unknown => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::WarmUp => "warm-up",
            Stage::Qualifying => "qualifying",
            Stage::Race => "race",
            Stage::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<i32>() {
            return Ok(Stage::from_code(code));
        }
        match s.to_lowercase().as_str() {
            "warm-up" | "warmup" | "warm_up" => Ok(Stage::WarmUp),
            "qualifying" => Ok(Stage::Qualifying),
            "race" => Ok(Stage::Race),
            "unknown" => Ok(Stage::Unknown),
            _ => Err(format!("Unknown stage: {}", s)),
        }
    }
}

/// Configuration for a racing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Bot identifier sent ahead of the init message (default: "SCR")
    pub bot_id: String,

    /// Race stage (default: Unknown)
    pub stage: Stage,

    /// Track name, informational only
    pub track: Option<String>,

    /// Control messages per episode before ending it (0 = unbounded)
    pub max_steps: u32,

    /// Episodes before shutting down (0 = until the server shuts down)
    pub max_episodes: u32,

    /// Identification requests per episode before giving up (None = unbounded)
    pub max_identify_attempts: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bot_id: "SCR".to_string(),
            stage: Stage::Unknown,
            track: None,
            max_steps: 0,
            max_episodes: 0,
            max_identify_attempts: None,
        }
    }
}

impl SessionConfig {
    /// Creates a config for the given bot id.
    pub fn new(bot_id: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
            ..Self::default()
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_track(mut self, track: impl Into<String>) -> Self {
        self.track = Some(track.into());
        self
    }

    /// Sets the step budget per episode.
    pub fn with_max_steps(mut self, steps: u32) -> Self {
        self.max_steps = steps;
        self
    }

    /// Sets the episode budget.
    pub fn with_max_episodes(mut self, episodes: u32) -> Self {
        self.max_episodes = episodes;
        self
    }

    /// Caps identification attempts per episode.
    pub fn with_identify_cap(mut self, attempts: u32) -> Self {
        self.max_identify_attempts = Some(attempts);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.bot_id, "SCR");
        assert_eq!(config.stage, Stage::Unknown);
        assert_eq!(config.max_steps, 0);
        assert_eq!(config.max_episodes, 0);
        assert!(config.max_identify_attempts.is_none());
    }

    #[test]
    fn test_stage_codes() {
        for code in 0..4 {
            assert_eq!(Stage::from_code(code).code(), code);
        }
        assert_eq!(Stage::from_code(42), Stage::Unknown);
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!("2".parse::<Stage>().unwrap(), Stage::Race);
        assert_eq!("Warm-Up".parse::<Stage>().unwrap(), Stage::WarmUp);
        assert_eq!("qualifying".parse::<Stage>().unwrap(), Stage::Qualifying);
        assert!("sprint".parse::<Stage>().is_err());
    }
}
