//! Configuration carried by alarm tree items.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TitleDetail {
  pub title: String,
  pub detail: String,
}

impl TitleDetail {
  pub fn new(title: impl Into<String>, detail: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      detail: detail.into(),
    }
  }
}

/// Automated action, triggered `delay` seconds after an alarm.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TitleDetailDelay {
  pub title: String,
  pub detail: String,
  pub delay: u32,
}

impl TitleDetailDelay {
  pub fn new(title: impl Into<String>, detail: impl Into<String>, delay: u32) -> Self {
    Self {
      title: title.into(),
      detail: detail.into(),
      delay,
    }
  }
}

/// Enablement of a leaf, including a scheduled re-enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnabledState {
  pub enabled: bool,
  pub enabled_date: Option<DateTime<Utc>>,
}

impl EnabledState {
  pub const fn enabled() -> Self {
    Self {
      enabled: true,
      enabled_date: None,
    }
  }

  pub const fn disabled() -> Self {
    Self {
      enabled: false,
      enabled_date: None,
    }
  }

  /// Disabled until `date`.
  pub const fn until(date: DateTime<Utc>) -> Self {
    Self {
      enabled: false,
      enabled_date: Some(date),
    }
  }
}

impl Default for EnabledState {
  fn default() -> Self {
    Self::enabled()
  }
}

/// Settings every item carries, node or leaf.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemConfig {
  pub guidance: Vec<TitleDetail>,
  pub displays: Vec<TitleDetail>,
  pub commands: Vec<TitleDetail>,
  pub actions: Vec<TitleDetailDelay>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafConfig {
  pub description: String,
  pub enabled: EnabledState,
  pub latching: bool,
  pub annunciating: bool,
  /// Seconds a condition must persist before it alarms.
  pub delay: u32,
  /// Number of repeated alarms within `delay` that also trigger.
  pub count: u32,
  pub filter: String,
}

impl Default for LeafConfig {
  fn default() -> Self {
    Self {
      description: String::new(),
      enabled: EnabledState::enabled(),
      latching: true,
      annunciating: true,
      delay: 0,
      count: 0,
      filter: String::new(),
    }
  }
}

/// Store `value` in `slot`, reporting whether it differed.
pub(crate) fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
  if *slot == value {
    return false;
  }
  *slot = value;
  true
}
