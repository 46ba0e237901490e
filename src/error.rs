//! Error types for the alarm replica.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AlarmError>;

#[derive(Debug, Error)]
pub enum AlarmError {
  /// Record key without a `type:` prefix.
  #[error("invalid key, expecting type:path, got {0}")]
  InvalidKey(String),

  /// Path does not start at the configured root.
  #[error("invalid path for alarm configuration {root}: {path}")]
  InvalidPath { root: String, path: String },

  /// An intermediate path segment resolved to a leaf.
  #[error("expected intermediate node, found leaf {name} while traversing {path}")]
  PathThroughLeaf { name: String, path: String },

  #[error("invalid payload for {path}: {message}")]
  InvalidPayload { path: String, message: String },

  #[error("serialization error: {0}")]
  Serialization(String),

  #[error("transport error: {0}")]
  Transport(String),

  #[error("unknown listener")]
  UnknownListener,

  #[error("alarm client already started")]
  AlreadyStarted,

  #[error("timeout: {0}")]
  Timeout(String),

  /// Bootstrap saw no structural update at all within the initial window.
  #[error("no alarm tree updates received within {0:?}")]
  NoInitialContact(std::time::Duration),

  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for AlarmError {
  fn from(error: serde_json::Error) -> Self {
    AlarmError::Serialization(error.to_string())
  }
}
