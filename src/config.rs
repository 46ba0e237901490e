//! Alarm client options.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{AlarmError, Result};

pub const DEFAULT_COMMAND_TOPIC_SUFFIX: &str = "Command";
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(100);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Who is issuing outbound config, command and delete records.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
  pub user: String,
  pub host: String,
}

impl Identity {
  pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
    Self {
      user: user.into(),
      host: host.into(),
    }
  }

  /// Current user and host from the environment.
  pub fn from_env() -> Self {
    let user = std::env::var("USER")
      .or_else(|_| std::env::var("USERNAME"))
      .unwrap_or_else(|_| "???".to_string());
    let host = std::env::var("HOSTNAME")
      .or_else(|_| std::env::var("COMPUTERNAME"))
      .unwrap_or_else(|_| "???".to_string());
    Self { user, host }
  }
}

impl Default for Identity {
  fn default() -> Self {
    Self::from_env()
  }
}

/// Options for an [`AlarmClient`](crate::AlarmClient).
///
/// Durations are given in milliseconds when loaded from JSON:
///
/// ```json
/// { "config_name": "Accelerator", "idle_timeout_ms": 10000 }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlarmClientOptions {
  /// Root name; also the name of the config/state stream.
  pub config_name: String,
  pub command_topic_suffix: String,
  /// Upstream is considered gone after three times this long without state.
  #[serde(rename = "idle_timeout_ms", with = "duration_ms")]
  pub idle_timeout: Duration,
  /// Bounded wait of a single poll.
  #[serde(rename = "poll_period_ms", with = "duration_ms")]
  pub poll_period: Duration,
  /// How long `shutdown` waits for the background task.
  #[serde(rename = "shutdown_timeout_ms", with = "duration_ms")]
  pub shutdown_timeout: Duration,
  pub identity: Identity,
}

impl Default for AlarmClientOptions {
  fn default() -> Self {
    Self {
      config_name: String::new(),
      command_topic_suffix: DEFAULT_COMMAND_TOPIC_SUFFIX.to_string(),
      idle_timeout: DEFAULT_IDLE_TIMEOUT,
      poll_period: DEFAULT_POLL_PERIOD,
      shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
      identity: Identity::from_env(),
    }
  }
}

impl AlarmClientOptions {
  pub fn new(config_name: impl Into<String>) -> Self {
    Self {
      config_name: config_name.into(),
      ..Self::default()
    }
  }

  pub fn command_topic_suffix(mut self, suffix: impl Into<String>) -> Self {
    self.command_topic_suffix = suffix.into();
    self
  }

  pub fn idle_timeout(mut self, timeout: Duration) -> Self {
    self.idle_timeout = timeout;
    self
  }

  pub fn poll_period(mut self, period: Duration) -> Self {
    self.poll_period = period;
    self
  }

  pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
    self.shutdown_timeout = timeout;
    self
  }

  pub fn identity(mut self, identity: Identity) -> Self {
    self.identity = identity;
    self
  }

  /// Name of the config/state stream.
  pub fn config_topic(&self) -> &str {
    &self.config_name
  }

  pub fn command_topic(&self) -> String {
    format!("{}{}", self.config_name, self.command_topic_suffix)
  }

  pub fn from_json_str(text: &str) -> Result<Self> {
    let options: Self = serde_json::from_str(text)
      .map_err(|error| AlarmError::Config(format!("decode alarm client options: {error}")))?;
    options.validate()?;
    Ok(options)
  }

  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
    let text = std::fs::read_to_string(path.as_ref())?;
    Self::from_json_str(&text)
  }

  pub fn validate(&self) -> Result<()> {
    if self.config_name.trim().is_empty() {
      return Err(AlarmError::Config("config_name must not be empty".into()));
    }
    if self.config_name.contains('/') {
      return Err(AlarmError::Config(format!(
        "config_name must not contain '/': {}",
        self.config_name
      )));
    }
    for (name, value) in [
      ("idle_timeout", self.idle_timeout),
      ("poll_period", self.poll_period),
      ("shutdown_timeout", self.shutdown_timeout),
    ] {
      if value.is_zero() {
        return Err(AlarmError::Config(format!("{name} must be > 0")));
      }
    }
    Ok(())
  }
}

mod duration_ms {
  use serde::{Deserialize, Deserializer};
  use std::time::Duration;

  pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
  where
    D: Deserializer<'de>,
  {
    u64::deserialize(deserializer).map(Duration::from_millis)
  }
}
