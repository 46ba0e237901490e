//! Alarm state carried by tree items.

use chrono::{DateTime, Utc};

use super::severity::SeverityLevel;

/// Rollup severity of a node, computed upstream and stored as delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicState {
  pub severity: SeverityLevel,
}

impl BasicState {
  pub const fn new(severity: SeverityLevel) -> Self {
    Self { severity }
  }
}

impl Default for BasicState {
  fn default() -> Self {
    Self::new(SeverityLevel::Ok)
  }
}

/// Full alarm state of a leaf.
///
/// `severity`/`message` describe the latched alarm that awaits
/// acknowledgement, `current_severity`/`current_message` the live condition
/// of the signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientState {
  pub severity: SeverityLevel,
  pub message: String,
  pub value: String,
  pub time: Option<DateTime<Utc>>,
  pub latch: bool,
  pub current_severity: SeverityLevel,
  pub current_message: String,
}

impl Default for ClientState {
  fn default() -> Self {
    Self {
      severity: SeverityLevel::Ok,
      message: String::new(),
      value: String::new(),
      time: None,
      latch: false,
      current_severity: SeverityLevel::Ok,
      current_message: String::new(),
    }
  }
}
