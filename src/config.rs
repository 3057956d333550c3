//! Engine configuration

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_HANDLER_TIMEOUT_MS: u64 = 5000;
const DEFAULT_MAX_STEPS_PER_TURN: usize = 64;

/// Runtime knobs shared by every session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on a single handler call
    pub handler_timeout: Duration,
    /// Executed actions plus plan requests allowed in one turn
    pub max_steps_per_turn: usize,
    /// Echo context snapshots to the user around every action
    pub debug: bool,
    /// Story document loaded by the console
    pub story_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_millis(DEFAULT_HANDLER_TIMEOUT_MS),
            max_steps_per_turn: DEFAULT_MAX_STEPS_PER_TURN,
            debug: false,
            story_path: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unparsable values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let handler_timeout = lookup("TICK_HANDLER_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .map_or(defaults.handler_timeout, Duration::from_millis);

        let max_steps_per_turn = lookup("TICK_MAX_STEPS_PER_TURN")
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_steps_per_turn);

        let debug = lookup("TICK_DEBUG").is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes"));

        Self {
            handler_timeout,
            max_steps_per_turn,
            debug,
            story_path: lookup("TICK_STORY_PATH").map(PathBuf::from),
        }
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps_per_turn = steps;
        self
    }
}
