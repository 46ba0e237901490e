//! In-process replayable log.
//!
//! All topics share one append-only sequence, so records keep a total order.
//! Every consumer starts at offset zero and sees the full history.

use chrono::Utc;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{LogConsumer, LogRecord, RecordProducer, Wakeup};
use crate::error::{AlarmError, Result};

#[derive(Debug, Default)]
struct BrokerState {
  records: Vec<LogRecord>,
  fail_sends: bool,
  fail_polls: bool,
}

#[derive(Debug, Default)]
struct BrokerInner {
  state: Mutex<BrokerState>,
  appended: Condvar,
}

impl BrokerInner {
  /// Append under the caller's lock and wake waiting consumers.
  fn push(&self, state: &mut BrokerState, topic: &str, key: &str, value: Option<&str>) -> u64 {
    let offset = state.records.len() as u64;
    state.records.push(LogRecord {
      topic: topic.to_string(),
      key: key.to_string(),
      value: value.map(str::to_string),
      timestamp: Utc::now(),
      offset,
    });
    self.appended.notify_all();
    offset
  }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
  inner: Arc<BrokerInner>,
}

impl MemoryBroker {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn producer(&self) -> MemoryProducer {
    MemoryProducer {
      inner: Arc::clone(&self.inner),
    }
  }

  /// Consumer that replays `topics` from the beginning.
  pub fn consumer<I, S>(&self, topics: I) -> MemoryConsumer
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    MemoryConsumer {
      inner: Arc::clone(&self.inner),
      topics: topics.into_iter().map(Into::into).collect(),
      position: 0,
      woken: Arc::new(AtomicBool::new(false)),
      closed: false,
    }
  }

  pub fn append(&self, topic: &str, key: &str, value: Option<&str>) -> u64 {
    let mut state = self.inner.state.lock();
    self.inner.push(&mut state, topic, key, value)
  }

  pub fn records(&self, topic: &str) -> Vec<LogRecord> {
    let state = self.inner.state.lock();
    state
      .records
      .iter()
      .filter(|record| record.topic == topic)
      .cloned()
      .collect()
  }

  pub fn len(&self) -> usize {
    self.inner.state.lock().records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Make every subsequent send fail.
  pub fn set_fail_sends(&self, fail: bool) {
    self.inner.state.lock().fail_sends = fail;
  }

  /// Make every subsequent poll fail, as a lost broker connection would.
  pub fn set_fail_polls(&self, fail: bool) {
    let mut state = self.inner.state.lock();
    state.fail_polls = fail;
    self.inner.appended.notify_all();
  }
}

#[derive(Debug, Clone)]
pub struct MemoryProducer {
  inner: Arc<BrokerInner>,
}

impl RecordProducer for MemoryProducer {
  fn send(&self, topic: &str, key: &str, value: Option<&str>) -> Result<()> {
    let mut state = self.inner.state.lock();
    if state.fail_sends {
      return Err(AlarmError::Transport(format!(
        "send to {topic} rejected: {key}"
      )));
    }
    self.inner.push(&mut state, topic, key, value);
    Ok(())
  }
}

#[derive(Debug)]
pub struct MemoryConsumer {
  inner: Arc<BrokerInner>,
  topics: Vec<String>,
  position: usize,
  woken: Arc<AtomicBool>,
  closed: bool,
}

impl MemoryConsumer {
  fn drain_available(&mut self, records: &[LogRecord]) -> Vec<LogRecord> {
    let batch = records[self.position..]
      .iter()
      .filter(|record| self.topics.iter().any(|topic| *topic == record.topic))
      .cloned()
      .collect();
    self.position = records.len();
    batch
  }
}

impl LogConsumer for MemoryConsumer {
  fn poll(&mut self, timeout: Duration) -> Result<Vec<LogRecord>> {
    if self.closed {
      return Err(AlarmError::Transport("consumer is closed".to_string()));
    }

    let deadline = Instant::now() + timeout;
    let inner = Arc::clone(&self.inner);
    let mut state = inner.state.lock();
    loop {
      if state.fail_polls {
        return Err(AlarmError::Transport("broker connection lost".to_string()));
      }
      if state.records.len() > self.position {
        let batch = self.drain_available(&state.records);
        if !batch.is_empty() {
          return Ok(batch);
        }
      }
      if self.woken.swap(false, Ordering::AcqRel) {
        return Ok(Vec::new());
      }
      if inner.appended.wait_until(&mut state, deadline).timed_out() {
        return Ok(Vec::new());
      }
    }
  }

  fn wakeup_handle(&self) -> Arc<dyn Wakeup> {
    Arc::new(MemoryWakeup {
      inner: Arc::clone(&self.inner),
      woken: Arc::clone(&self.woken),
    })
  }

  fn close(&mut self) {
    self.closed = true;
  }
}

struct MemoryWakeup {
  inner: Arc<BrokerInner>,
  woken: Arc<AtomicBool>,
}

impl Wakeup for MemoryWakeup {
  fn wakeup(&self) {
    let _state = self.inner.state.lock();
    self.woken.store(true, Ordering::Release);
    self.inner.appended.notify_all();
  }
}
