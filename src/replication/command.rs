//! Outbound records: operator commands plus configuration and delete
//! requests.
//!
//! Every send is fire-and-forget. The only confirmation is a later record on
//! the config/state stream.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::{COMMAND_PREFIX, CONFIG_PREFIX};
use crate::codec;
use crate::config::Identity;
use crate::error::{AlarmError, Result};
use crate::model::{AlarmTreePath, ItemConfig, LeafConfig};
use crate::transport::RecordProducer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmCommand {
  Acknowledge,
  Unacknowledge,
  Maintenance,
  Normal,
  EnableNotify,
  DisableNotify,
}

impl AlarmCommand {
  pub const fn acknowledge(acknowledge: bool) -> Self {
    if acknowledge {
      AlarmCommand::Acknowledge
    } else {
      AlarmCommand::Unacknowledge
    }
  }

  pub const fn mode(maintenance: bool) -> Self {
    if maintenance {
      AlarmCommand::Maintenance
    } else {
      AlarmCommand::Normal
    }
  }

  pub const fn notify(disable_notify: bool) -> Self {
    if disable_notify {
      AlarmCommand::DisableNotify
    } else {
      AlarmCommand::EnableNotify
    }
  }

  pub const fn as_str(self) -> &'static str {
    match self {
      AlarmCommand::Acknowledge => "acknowledge",
      AlarmCommand::Unacknowledge => "unacknowledge",
      AlarmCommand::Maintenance => "maintenance",
      AlarmCommand::Normal => "normal",
      AlarmCommand::EnableNotify => "enable_notify",
      AlarmCommand::DisableNotify => "disable_notify",
    }
  }
}

impl fmt::Display for AlarmCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for AlarmCommand {
  type Err = AlarmError;

  fn from_str(raw: &str) -> Result<Self> {
    match raw {
      "acknowledge" => Ok(AlarmCommand::Acknowledge),
      "unacknowledge" => Ok(AlarmCommand::Unacknowledge),
      "maintenance" => Ok(AlarmCommand::Maintenance),
      "normal" => Ok(AlarmCommand::Normal),
      "enable_notify" => Ok(AlarmCommand::EnableNotify),
      "disable_notify" => Ok(AlarmCommand::DisableNotify),
      other => Err(AlarmError::Serialization(format!(
        "unknown alarm command: {other}"
      ))),
    }
  }
}

pub struct CommandPublisher {
  producer: Arc<dyn RecordProducer>,
  config_topic: String,
  command_topic: String,
  identity: Identity,
}

impl fmt::Debug for CommandPublisher {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CommandPublisher")
      .field("config_topic", &self.config_topic)
      .field("command_topic", &self.command_topic)
      .field("identity", &self.identity)
      .finish()
  }
}

impl CommandPublisher {
  pub fn new(
    producer: Arc<dyn RecordProducer>,
    config_topic: impl Into<String>,
    command_topic: impl Into<String>,
    identity: Identity,
  ) -> Self {
    Self {
      producer,
      config_topic: config_topic.into(),
      command_topic: command_topic.into(),
      identity,
    }
  }

  pub fn try_send_command(&self, path: &AlarmTreePath, command: AlarmCommand) -> Result<()> {
    let payload = codec::command_to_json(command, &self.identity)?;
    let key = format!("{COMMAND_PREFIX}{path}");
    self.producer.send(&self.command_topic, &key, Some(&payload))
  }

  /// Publish `command` for `path`; failures are logged.
  pub fn send_command(&self, path: &AlarmTreePath, command: AlarmCommand) {
    match self.try_send_command(path, command) {
      Ok(()) => tracing::debug!(path = %path, command = %command, "sent alarm command"),
      Err(error) => tracing::warn!(
        path = %path,
        command = %command,
        error = %error,
        "cannot send alarm command"
      ),
    }
  }

  /// Publish the configuration of one item. `leaf` marks the item as a leaf.
  pub fn send_config(
    &self,
    path: &AlarmTreePath,
    config: &ItemConfig,
    leaf: Option<&LeafConfig>,
  ) -> Result<()> {
    let payload = codec::item_config_to_json(config, leaf, &self.identity)?;
    let key = format!("{CONFIG_PREFIX}{path}");
    self.producer.send(&self.config_topic, &key, Some(&payload))
  }

  /// Identification record followed by the tombstone for one path.
  pub fn send_delete(&self, path: &AlarmTreePath) -> Result<()> {
    let payload = codec::delete_message_to_json(&self.identity)?;
    let key = format!("{CONFIG_PREFIX}{path}");
    self.producer.send(&self.config_topic, &key, Some(&payload))?;
    self.producer.send(&self.config_topic, &key, None)
  }

  pub fn close(&self) {
    self.producer.close();
  }
}
