//! Commit-log transport boundary.
//!
//! The client only relies on the consumed contract: records are delivered in
//! order per key, a new consumer replays from the start, and a record without
//! a value is a tombstone. Broker connection handling, partitioning and
//! retries belong to the implementations.

pub mod memory;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

pub use memory::{MemoryBroker, MemoryConsumer, MemoryProducer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
  pub topic: String,
  pub key: String,
  /// `None` marks a tombstone.
  pub value: Option<String>,
  pub timestamp: DateTime<Utc>,
  pub offset: u64,
}

impl LogRecord {
  pub fn is_tombstone(&self) -> bool {
    self.value.is_none()
  }
}

/// Interrupts a blocked [`LogConsumer::poll`] from another thread.
pub trait Wakeup: Send + Sync {
  fn wakeup(&self);
}

pub trait LogConsumer: Send {
  /// Wait at most `timeout` for the next batch; an empty batch is normal.
  fn poll(&mut self, timeout: Duration) -> Result<Vec<LogRecord>>;

  fn wakeup_handle(&self) -> Arc<dyn Wakeup>;

  fn close(&mut self) {}
}

pub trait RecordProducer: Send + Sync {
  /// Fire-and-forget append; `value: None` writes a tombstone.
  fn send(&self, topic: &str, key: &str, value: Option<&str>) -> Result<()>;

  fn close(&self) {}
}
