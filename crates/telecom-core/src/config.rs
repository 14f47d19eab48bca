//! Configuration for the telecom core
//!
//! All settings have defaults, so an empty file is a valid configuration.
//!
//! ```rust
//! use rvoip_telecom_core::config::TelecomConfig;
//!
//! let config = TelecomConfig::new()
//!     .with_emergency_numbers(vec!["911".to_string()])
//!     .with_connection_attempt_timeout_ms(Some(10_000));
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.limits.max_live_calls, 1);
//! ```
//!
//! Files are TOML:
//!
//! ```toml
//! emergency_numbers = ["911", "112"]
//!
//! [limits]
//! max_top_level_calls = 2
//!
//! [timeouts]
//! dtmf_tone_delay_ms = 300
//!
//! [logging]
//! install = true
//! filter = "rvoip_telecom_core=debug,info"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TelecomError, TelecomResult};
use crate::logging::LoggingConfig;

/// Environment prefix for overrides, e.g. `TELECOM__LIMITS__MAX_HELD_CALLS=2`
pub const ENV_PREFIX: &str = "TELECOM";

/// How many calls may be in each category at once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallLimits {
    /// Calls in Connecting, SelectAccount, Dialing or Active
    pub max_live_calls: usize,
    pub max_held_calls: usize,
    pub max_ringing_calls: usize,
    pub max_dialing_calls: usize,
    /// Calls in Connecting, SelectAccount or Dialing
    pub max_outgoing_calls: usize,
    /// Tracked calls that are not conference children
    pub max_top_level_calls: usize,
}

impl Default for CallLimits {
    fn default() -> Self {
        Self {
            max_live_calls: 1,
            max_held_calls: 1,
            max_ringing_calls: 1,
            max_dialing_calls: 1,
            max_outgoing_calls: 1,
            max_top_level_calls: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long a post-dial tone plays before it is stopped
    pub dtmf_tone_delay_ms: u64,
    /// How long a cancelled outgoing call waits to be reused
    pub new_outgoing_call_cancel_ms: u64,
    /// Give up on a provider that does not answer a connection attempt
    pub connection_attempt_timeout_ms: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            dtmf_tone_delay_ms: 300,
            new_outgoing_call_cancel_ms: 400,
            connection_attempt_timeout_ms: None,
        }
    }
}

impl TimeoutConfig {
    pub fn dtmf_tone_delay(&self) -> Duration {
        Duration::from_millis(self.dtmf_tone_delay_ms)
    }

    pub fn new_outgoing_call_cancel(&self) -> Duration {
        Duration::from_millis(self.new_outgoing_call_cancel_ms)
    }

    pub fn connection_attempt_timeout(&self) -> Option<Duration> {
        self.connection_attempt_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Device has a handset earpiece
    pub earpiece_supported: bool,
    /// Answer video calls on the speaker when nothing else is connected
    pub speaker_for_video_calls: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            earpiece_supported: true,
            speaker_for_video_calls: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelecomConfig {
    pub limits: CallLimits,
    pub timeouts: TimeoutConfig,
    pub audio: AudioConfig,
    pub logging: LoggingConfig,
    /// Numbers treated as emergency calls on the `tel` scheme
    pub emergency_numbers: Vec<String>,
    /// Capacity of the service inbox
    pub event_channel_capacity: usize,
}

impl Default for TelecomConfig {
    fn default() -> Self {
        Self {
            limits: CallLimits::default(),
            timeouts: TimeoutConfig::default(),
            audio: AudioConfig::default(),
            logging: LoggingConfig::default(),
            emergency_numbers: vec!["911".to_string(), "112".to_string()],
            event_channel_capacity: 1000,
        }
    }
}

impl TelecomConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, limits: CallLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_max_top_level_calls(mut self, max: usize) -> Self {
        self.limits.max_top_level_calls = max;
        self
    }

    pub fn with_emergency_numbers(mut self, numbers: Vec<String>) -> Self {
        self.emergency_numbers = numbers;
        self
    }

    pub fn with_dtmf_tone_delay_ms(mut self, ms: u64) -> Self {
        self.timeouts.dtmf_tone_delay_ms = ms;
        self
    }

    pub fn with_new_outgoing_call_cancel_ms(mut self, ms: u64) -> Self {
        self.timeouts.new_outgoing_call_cancel_ms = ms;
        self
    }

    pub fn with_connection_attempt_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.timeouts.connection_attempt_timeout_ms = ms;
        self
    }

    pub fn with_earpiece_supported(mut self, supported: bool) -> Self {
        self.audio.earpiece_supported = supported;
        self
    }

    pub fn with_speaker_for_video_calls(mut self, enabled: bool) -> Self {
        self.audio.speaker_for_video_calls = enabled;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn from_toml_str(s: &str) -> TelecomResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, then apply `TELECOM__*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> TelecomResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TelecomResult<()> {
        let limits = &self.limits;
        let named = [
            ("max_live_calls", limits.max_live_calls),
            ("max_held_calls", limits.max_held_calls),
            ("max_ringing_calls", limits.max_ringing_calls),
            ("max_dialing_calls", limits.max_dialing_calls),
            ("max_outgoing_calls", limits.max_outgoing_calls),
            ("max_top_level_calls", limits.max_top_level_calls),
        ];
        if let Some((name, _)) = named.iter().find(|(_, value)| *value == 0) {
            return Err(TelecomError::config(format!("{} must be greater than 0", name)));
        }
        if limits.max_top_level_calls < limits.max_live_calls {
            return Err(TelecomError::config(
                "max_top_level_calls must be at least max_live_calls",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(TelecomError::config("event_channel_capacity must be greater than 0"));
        }
        self.logging.env_filter()?;
        Ok(())
    }
}
