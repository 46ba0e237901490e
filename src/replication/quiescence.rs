//! Detect the end of the initial configuration load.
//!
//! The log has no end-of-snapshot marker. Instead the detector counts
//! structural edits (`item_added`, `item_removed`) and declares the load
//! complete once they pause for `idle_timeout`. The countdown starts at
//! `initial_timeout` when the detector is created.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::listener::{AlarmClientListener, ListenerId, ListenerRegistry};
use crate::error::{AlarmError, Result};
use crate::model::AlarmTreeItem;

#[derive(Debug)]
struct EditState {
  last_edit: Option<Instant>,
  count: u64,
}

#[derive(Debug)]
struct EditMonitor {
  state: Mutex<EditState>,
  edited: Condvar,
}

impl EditMonitor {
  fn record(&self) {
    let mut state = self.state.lock();
    state.last_edit = Some(Instant::now());
    state.count += 1;
    self.edited.notify_all();
  }
}

struct EditCounter {
  monitor: Arc<EditMonitor>,
}

impl AlarmClientListener for EditCounter {
  fn item_added(&self, _item: &AlarmTreeItem) {
    self.monitor.record();
  }

  fn item_removed(&self, _item: &AlarmTreeItem) {
    self.monitor.record();
  }
}

#[derive(Debug)]
pub struct BootstrapQuiescenceDetector {
  registry: Arc<ListenerRegistry>,
  listener: Mutex<Option<ListenerId>>,
  monitor: Arc<EditMonitor>,
  created: Instant,
  initial_timeout: Duration,
  idle_timeout: Duration,
}

impl BootstrapQuiescenceDetector {
  /// Start counting edits seen by `registry`.
  pub fn new(
    registry: Arc<ListenerRegistry>,
    initial_timeout: Duration,
    idle_timeout: Duration,
  ) -> Self {
    let monitor = Arc::new(EditMonitor {
      state: Mutex::new(EditState {
        last_edit: None,
        count: 0,
      }),
      edited: Condvar::new(),
    });
    let listener = registry.add(Arc::new(EditCounter {
      monitor: Arc::clone(&monitor),
    }));
    Self {
      registry,
      listener: Mutex::new(Some(listener)),
      monitor,
      created: Instant::now(),
      initial_timeout,
      idle_timeout,
    }
  }

  /// Block until edits pause for `idle_timeout`.
  ///
  /// Fails with [`AlarmError::NoInitialContact`] when no edit arrived within
  /// `initial_timeout`, and with [`AlarmError::Timeout`] when edits keep
  /// coming past `overall_timeout`. On success the edit count restarts at
  /// zero.
  pub fn wait_for_pause_in_updates(&self, overall_timeout: Duration) -> Result<()> {
    let overall_deadline = Instant::now() + overall_timeout;
    let mut state = self.monitor.state.lock();
    loop {
      let now = Instant::now();
      let quiet_deadline = match state.last_edit {
        Some(last_edit) => last_edit + self.idle_timeout,
        None => self.created + self.initial_timeout,
      };

      if now >= quiet_deadline {
        if state.last_edit.is_none() {
          return Err(AlarmError::NoInitialContact(self.initial_timeout));
        }
        tracing::debug!(edits = state.count, "alarm tree updates paused");
        state.count = 0;
        return Ok(());
      }
      if now >= overall_deadline {
        return Err(AlarmError::Timeout(format!(
          "alarm tree still changing after {overall_timeout:?} ({} edits)",
          state.count
        )));
      }

      let deadline = quiet_deadline.min(overall_deadline);
      let _ = self.monitor.edited.wait_until(&mut state, deadline);
    }
  }

  /// Structural edits seen since creation, or since the last successful wait.
  pub fn get_count(&self) -> u64 {
    self.monitor.state.lock().count
  }

  /// Stop counting. Safe to call more than once.
  pub fn dispose(&self) {
    if let Some(id) = self.listener.lock().take() {
      if let Err(error) = self.registry.remove(id) {
        tracing::debug!(error = %error, "quiescence listener already gone");
      }
    }
  }
}

impl Drop for BootstrapQuiescenceDetector {
  fn drop(&mut self) {
    self.dispose();
  }
}
