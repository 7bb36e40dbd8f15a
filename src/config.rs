//! Configuration loading for MargaNav

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{NavError, Result};
use crate::types::MovementMode;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MargaConfig {
    #[serde(default)]
    pub identifier: IdentifierConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

/// Room identification settings
#[derive(Clone, Debug, Deserialize)]
pub struct IdentifierConfig {
    /// Confidence reported when the expected room's label matches (default: 0.95)
    #[serde(default = "default_fast_tier_confidence")]
    pub fast_tier_confidence: f32,

    /// Label similarity treated as a near-exact match by the fast tier (default: 0.92)
    #[serde(default = "default_near_exact_similarity")]
    pub near_exact_similarity: f32,

    /// Minimum label similarity for fuzzy candidates (default: 0.75)
    #[serde(default = "default_candidate_similarity")]
    pub candidate_similarity: f32,

    /// Results below this confidence are discarded (default: 0.3)
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// Match cache entry lifetime in seconds (default: 300)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Maximum cached matches across all shards (default: 1024)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Number of cache shards (default: 16)
    #[serde(default = "default_cache_shards")]
    pub cache_shards: usize,
}

/// Path planning settings
#[derive(Clone, Debug, Deserialize)]
pub struct PlannerConfig {
    /// Maximum node expansions before giving up (default: 20000)
    #[serde(default = "default_max_expansions")]
    pub max_expansions: usize,

    /// Cost added per danger level of the room entered (default: 0.5)
    #[serde(default = "default_danger_weight")]
    pub danger_weight: f32,

    /// Multiplier on the distance heuristic (default: 1.0). Values above
    /// 1.0 expand fewer rooms but may return costlier routes
    #[serde(default = "default_heuristic_scale")]
    pub heuristic_scale: f32,

    /// Base expected duration of one move in ms (default: 600)
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,

    /// Extra duration for opening a door in ms (default: 400)
    #[serde(default = "default_door_delay_ms")]
    pub door_delay_ms: u64,

    /// Extra duration for a hidden exit in ms (default: 600)
    #[serde(default = "default_hidden_delay_ms")]
    pub hidden_delay_ms: u64,
}

/// Movement execution settings
#[derive(Clone, Debug, Deserialize)]
pub struct ExecutorConfig {
    /// Initial movement mode (default: reliable)
    #[serde(default)]
    pub mode: MovementMode,

    /// Fallback timeout while waiting for confirmation in ms (default: 8000)
    #[serde(default = "default_reliable_timeout_ms")]
    pub reliable_timeout_ms: u64,

    /// Delay raced against confirmation in balanced mode in ms (default: 200)
    #[serde(default = "default_balanced_delay_ms")]
    pub balanced_delay_ms: u64,

    /// Fixed delay per step in fast mode in ms (default: 50)
    #[serde(default = "default_fast_delay_ms")]
    pub fast_delay_ms: u64,

    /// Fast mode surcharge for door exits in ms (default: 200)
    #[serde(default = "default_fast_door_surcharge_ms")]
    pub fast_door_surcharge_ms: u64,

    /// Fast mode surcharge for hidden exits in ms (default: 300)
    #[serde(default = "default_fast_hidden_surcharge_ms")]
    pub fast_hidden_surcharge_ms: u64,
}

/// Coordinator and safety loop settings
#[derive(Clone, Debug, Deserialize)]
pub struct CoordinatorConfig {
    /// Minimum position confidence required to start (default: 0.7)
    #[serde(default = "default_start_confidence")]
    pub start_confidence: f32,

    /// Matches below this raise an alert (default: 0.6)
    #[serde(default = "default_alert_confidence")]
    pub alert_confidence: f32,

    /// Matches at or above this proceed silently (default: 0.8)
    #[serde(default = "default_quiet_confidence")]
    pub quiet_confidence: f32,

    /// Highest room danger accepted on a route unless constraints allow more (default: 8)
    #[serde(default = "default_max_safe_danger")]
    pub max_safe_danger: u32,

    /// Safety loop period in ms (default: 2000)
    #[serde(default = "default_safety_interval_ms")]
    pub safety_interval_ms: u64,

    /// Pause when health drops below this percentage (default: 30)
    #[serde(default = "default_min_health_percent")]
    pub min_health_percent: f32,

    /// Resume a low-health pause at or above this percentage (default: 30)
    #[serde(default = "default_resume_health_percent")]
    pub resume_health_percent: f32,

    /// Alert when commands go this many ms without any confirmation (default: 10000)
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Delay before Completed returns to Idle in ms (default: 3000)
    #[serde(default = "default_completion_grace_ms")]
    pub completion_grace_ms: u64,

    /// Off-route replans allowed per attempt before erroring (default: 3)
    #[serde(default = "default_max_replans")]
    pub max_replans: usize,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            fast_tier_confidence: default_fast_tier_confidence(),
            near_exact_similarity: default_near_exact_similarity(),
            candidate_similarity: default_candidate_similarity(),
            min_confidence: default_min_confidence(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            cache_shards: default_cache_shards(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_expansions: default_max_expansions(),
            danger_weight: default_danger_weight(),
            heuristic_scale: default_heuristic_scale(),
            step_delay_ms: default_step_delay_ms(),
            door_delay_ms: default_door_delay_ms(),
            hidden_delay_ms: default_hidden_delay_ms(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: MovementMode::default(),
            reliable_timeout_ms: default_reliable_timeout_ms(),
            balanced_delay_ms: default_balanced_delay_ms(),
            fast_delay_ms: default_fast_delay_ms(),
            fast_door_surcharge_ms: default_fast_door_surcharge_ms(),
            fast_hidden_surcharge_ms: default_fast_hidden_surcharge_ms(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            start_confidence: default_start_confidence(),
            alert_confidence: default_alert_confidence(),
            quiet_confidence: default_quiet_confidence(),
            max_safe_danger: default_max_safe_danger(),
            safety_interval_ms: default_safety_interval_ms(),
            min_health_percent: default_min_health_percent(),
            resume_health_percent: default_resume_health_percent(),
            command_timeout_ms: default_command_timeout_ms(),
            completion_grace_ms: default_completion_grace_ms(),
            max_replans: default_max_replans(),
        }
    }
}

// Identifier defaults
fn default_fast_tier_confidence() -> f32 {
    0.95
}
fn default_near_exact_similarity() -> f32 {
    0.92
}
fn default_candidate_similarity() -> f32 {
    0.75
}
fn default_min_confidence() -> f32 {
    0.3
}
fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_cache_capacity() -> usize {
    1024
}
fn default_cache_shards() -> usize {
    16
}

// Planner defaults
fn default_max_expansions() -> usize {
    20_000
}
fn default_danger_weight() -> f32 {
    0.5
}
fn default_heuristic_scale() -> f32 {
    1.0
}
fn default_step_delay_ms() -> u64 {
    600
}
fn default_door_delay_ms() -> u64 {
    400
}
fn default_hidden_delay_ms() -> u64 {
    600
}

// Executor defaults
fn default_reliable_timeout_ms() -> u64 {
    8000
}
fn default_balanced_delay_ms() -> u64 {
    200
}
fn default_fast_delay_ms() -> u64 {
    50
}
fn default_fast_door_surcharge_ms() -> u64 {
    200
}
fn default_fast_hidden_surcharge_ms() -> u64 {
    300
}

// Coordinator defaults
fn default_start_confidence() -> f32 {
    0.7
}
fn default_alert_confidence() -> f32 {
    0.6
}
fn default_quiet_confidence() -> f32 {
    0.8
}
fn default_max_safe_danger() -> u32 {
    8
}
fn default_safety_interval_ms() -> u64 {
    2000
}
fn default_min_health_percent() -> f32 {
    30.0
}
fn default_resume_health_percent() -> f32 {
    30.0
}
fn default_command_timeout_ms() -> u64 {
    10_000
}
fn default_completion_grace_ms() -> u64 {
    3000
}
fn default_max_replans() -> usize {
    3
}

impl IdentifierConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl ExecutorConfig {
    pub fn reliable_timeout(&self) -> Duration {
        Duration::from_millis(self.reliable_timeout_ms)
    }

    pub fn balanced_delay(&self) -> Duration {
        Duration::from_millis(self.balanced_delay_ms)
    }
}

impl CoordinatorConfig {
    pub fn safety_interval(&self) -> Duration {
        Duration::from_millis(self.safety_interval_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn completion_grace(&self) -> Duration {
        Duration::from_millis(self.completion_grace_ms)
    }
}

impl MargaConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NavError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MargaConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let id = &self.identifier;
        if !(0.0..=1.0).contains(&id.fast_tier_confidence) {
            return Err(NavError::Config(
                "identifier.fast_tier_confidence must be within [0, 1]".to_string(),
            ));
        }
        if id.cache_shards == 0 {
            return Err(NavError::Config(
                "identifier.cache_shards must be at least 1".to_string(),
            ));
        }
        if self.planner.heuristic_scale < 0.0 {
            return Err(NavError::Config(
                "planner.heuristic_scale must not be negative".to_string(),
            ));
        }
        let co = &self.coordinator;
        if co.resume_health_percent < co.min_health_percent {
            return Err(NavError::Config(
                "coordinator.resume_health_percent must be >= min_health_percent".to_string(),
            ));
        }
        Ok(())
    }
}
