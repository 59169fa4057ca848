#![forbid(unsafe_code)]

//! Updater configuration.
//!
//! With the `policy-config` feature, a [`SchedulerConfig`] can be loaded
//! from a TOML or JSON policy file. Durations are in milliseconds and every
//! key is optional:
//!
//! ```toml
//! frame_budget_ms = 5
//! user_blocking_timeout_ms = 250
//! user_visible_timeout_ms = 5000
//! background_timeout_ms = 10000
//! idle_priority = "user-visible"
//! continuous_events = "always-downgrade"
//! ```

use std::fmt;
use std::time::Duration;

use weft_core::Priority;

/// How updates triggered during a continuous event pick a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinuousEventPolicy {
    /// Continuous events always map to the user-visible lane.
    #[default]
    AlwaysDowngrade,
    /// Join the user-blocking lane while user-blocking work is pending, so
    /// the continuous update batches with it.
    DeferToPendingDiscrete,
}

impl ContinuousEventPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlwaysDowngrade => "always-downgrade",
            Self::DeferToPendingDiscrete => "defer-to-pending-discrete",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "always-downgrade" => Some(Self::AlwaysDowngrade),
            "defer-to-pending-discrete" => Some(Self::DeferToPendingDiscrete),
            _ => None,
        }
    }
}

/// Configuration for the [`Updater`](crate::Updater).
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Time slice for one render or passive-commit slice. The yield check
    /// fires when the slice is used up, in addition to the host's own check.
    /// Default: 5ms
    pub frame_budget: Duration,

    /// After this long in the queue a user-blocking render ignores the
    /// yield check.
    /// Default: 250ms
    pub user_blocking_timeout: Duration,

    /// Deadline for user-visible renders.
    /// Default: 5s
    pub user_visible_timeout: Duration,

    /// Deadline for background renders.
    /// Default: 10s
    pub background_timeout: Duration,

    /// Priority used when no platform event is being dispatched.
    /// Default: `Priority::UserVisible`
    pub idle_priority: Priority,

    /// Lane choice for updates triggered by continuous events.
    /// Default: `ContinuousEventPolicy::AlwaysDowngrade`
    pub continuous_events: ContinuousEventPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_budget: Duration::from_millis(5),
            user_blocking_timeout: Duration::from_millis(250),
            user_visible_timeout: Duration::from_secs(5),
            background_timeout: Duration::from_secs(10),
            idle_priority: Priority::UserVisible,
            continuous_events: ContinuousEventPolicy::AlwaysDowngrade,
        }
    }
}

impl SchedulerConfig {
    /// Deadline offset for a lane.
    #[must_use]
    pub fn lane_timeout(&self, priority: Priority) -> Duration {
        match priority {
            Priority::UserBlocking => self.user_blocking_timeout,
            Priority::UserVisible => self.user_visible_timeout,
            Priority::Background => self.background_timeout,
        }
    }

    #[must_use]
    pub fn with_frame_budget(mut self, budget: Duration) -> Self {
        self.frame_budget = budget;
        self
    }

    #[must_use]
    pub fn with_lane_timeout(mut self, priority: Priority, timeout: Duration) -> Self {
        match priority {
            Priority::UserBlocking => self.user_blocking_timeout = timeout,
            Priority::UserVisible => self.user_visible_timeout = timeout,
            Priority::Background => self.background_timeout = timeout,
        }
        self
    }

    #[must_use]
    pub fn with_idle_priority(mut self, priority: Priority) -> Self {
        self.idle_priority = priority;
        self
    }

    #[must_use]
    pub fn with_continuous_events(mut self, policy: ContinuousEventPolicy) -> Self {
        self.continuous_events = policy;
        self
    }
}

/// Failure loading a policy file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The document did not parse.
    Parse { format: &'static str, message: String },
    /// A lane name was not recognized.
    UnknownPriority(String),
    /// A continuous-event policy name was not recognized.
    UnknownPolicy(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { format, message } => write!(f, "invalid {format} policy: {message}"),
            Self::UnknownPriority(name) => write!(f, "unknown priority: {name}"),
            Self::UnknownPolicy(name) => write!(f, "unknown continuous-event policy: {name}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(feature = "policy-config")]
mod policy {
    use std::time::Duration;

    use serde::Deserialize;
    use weft_core::Priority;

    use super::{ConfigError, ContinuousEventPolicy, SchedulerConfig};

    #[derive(Debug, Default, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct PolicyFile {
        frame_budget_ms: Option<u64>,
        user_blocking_timeout_ms: Option<u64>,
        user_visible_timeout_ms: Option<u64>,
        background_timeout_ms: Option<u64>,
        idle_priority: Option<String>,
        continuous_events: Option<String>,
    }

    impl PolicyFile {
        fn apply(self, mut config: SchedulerConfig) -> Result<SchedulerConfig, ConfigError> {
            if let Some(ms) = self.frame_budget_ms {
                config.frame_budget = Duration::from_millis(ms);
            }
            if let Some(ms) = self.user_blocking_timeout_ms {
                config.user_blocking_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = self.user_visible_timeout_ms {
                config.user_visible_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = self.background_timeout_ms {
                config.background_timeout = Duration::from_millis(ms);
            }
            if let Some(name) = self.idle_priority {
                config.idle_priority =
                    Priority::parse(&name).ok_or(ConfigError::UnknownPriority(name))?;
            }
            if let Some(name) = self.continuous_events {
                config.continuous_events =
                    ContinuousEventPolicy::parse(&name).ok_or(ConfigError::UnknownPolicy(name))?;
            }
            Ok(config)
        }
    }

    impl SchedulerConfig {
        /// Load a policy from TOML, starting from the defaults.
        pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
            let file: PolicyFile = toml::from_str(source).map_err(|err| ConfigError::Parse {
                format: "toml",
                message: err.to_string(),
            })?;
            file.apply(Self::default())
        }

        /// Load a policy from JSON, starting from the defaults.
        pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
            let file: PolicyFile =
                serde_json::from_str(source).map_err(|err| ConfigError::Parse {
                    format: "json",
                    message: err.to_string(),
                })?;
            file.apply(Self::default())
        }
    }
}
