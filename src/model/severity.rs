//! Alarm severity levels.

use std::fmt;
use std::str::FromStr;

use crate::error::AlarmError;

/// Severity, ordered from least to most urgent.
///
/// The `*Ack` levels describe an alarm that is still latched but has been
/// acknowledged; they rank below every active (unacknowledged) level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum SeverityLevel {
  Ok,
  MinorAck,
  MajorAck,
  InvalidAck,
  UndefinedAck,
  Minor,
  Major,
  Invalid,
  #[default]
  Undefined,
}

impl SeverityLevel {
  pub fn as_str(self) -> &'static str {
    match self {
      SeverityLevel::Ok => "OK",
      SeverityLevel::MinorAck => "MINOR_ACK",
      SeverityLevel::MajorAck => "MAJOR_ACK",
      SeverityLevel::InvalidAck => "INVALID_ACK",
      SeverityLevel::UndefinedAck => "UNDEFINED_ACK",
      SeverityLevel::Minor => "MINOR",
      SeverityLevel::Major => "MAJOR",
      SeverityLevel::Invalid => "INVALID",
      SeverityLevel::Undefined => "UNDEFINED",
    }
  }
}

impl fmt::Display for SeverityLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SeverityLevel {
  type Err = AlarmError;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    match raw {
      "OK" => Ok(Self::Ok),
      "MINOR_ACK" => Ok(Self::MinorAck),
      "MAJOR_ACK" => Ok(Self::MajorAck),
      "INVALID_ACK" => Ok(Self::InvalidAck),
      "UNDEFINED_ACK" => Ok(Self::UndefinedAck),
      "MINOR" => Ok(Self::Minor),
      "MAJOR" => Ok(Self::Major),
      "INVALID" => Ok(Self::Invalid),
      "UNDEFINED" => Ok(Self::Undefined),
      _ => Err(AlarmError::Serialization(format!(
        "invalid severity level: {raw}"
      ))),
    }
  }
}
