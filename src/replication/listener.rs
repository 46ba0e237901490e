//! Change notification fan-out.
//!
//! Registrations live in a copy-on-write list. Delivery walks the list that
//! was current when the event was raised, so listeners added later see none
//! of it. Removal deactivates the registration, then waits for a delivery to
//! that listener still running on another thread. Once `remove` returns the
//! listener is not called again. A listener may remove itself from inside a
//! callback.

use parking_lot::{Mutex, ReentrantMutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{AlarmError, Result};
use crate::model::AlarmTreeItem;

/// Receiver of alarm tree and server state changes. All methods default to
/// doing nothing.
///
/// Callbacks run on the replication thread. They may query the client but
/// should return quickly.
pub trait AlarmClientListener: Send + Sync {
  /// Upstream alarm server seen (`true`) or timed out (`false`).
  fn server_state_changed(&self, _alive: bool) {}

  fn server_mode_changed(&self, _maintenance_mode: bool) {}

  fn server_disable_notify_changed(&self, _disable_notify: bool) {}

  fn item_added(&self, _item: &AlarmTreeItem) {}

  fn item_removed(&self, _item: &AlarmTreeItem) {}

  fn item_updated(&self, _item: &AlarmTreeItem) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
  pub const fn raw(self) -> u64 {
    self.0
  }
}

/// One change, delivered to every active listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmEvent {
  ServerState(bool),
  ServerMode(bool),
  ServerDisableNotify(bool),
  ItemAdded(AlarmTreeItem),
  ItemRemoved(AlarmTreeItem),
  ItemUpdated(AlarmTreeItem),
}

impl AlarmEvent {
  fn deliver(&self, listener: &dyn AlarmClientListener) {
    match self {
      AlarmEvent::ServerState(alive) => listener.server_state_changed(*alive),
      AlarmEvent::ServerMode(maintenance) => listener.server_mode_changed(*maintenance),
      AlarmEvent::ServerDisableNotify(disabled) => listener.server_disable_notify_changed(*disabled),
      AlarmEvent::ItemAdded(item) => listener.item_added(item),
      AlarmEvent::ItemRemoved(item) => listener.item_removed(item),
      AlarmEvent::ItemUpdated(item) => listener.item_updated(item),
    }
  }

  fn name(&self) -> &'static str {
    match self {
      AlarmEvent::ServerState(_) => "server_state_changed",
      AlarmEvent::ServerMode(_) => "server_mode_changed",
      AlarmEvent::ServerDisableNotify(_) => "server_disable_notify_changed",
      AlarmEvent::ItemAdded(_) => "item_added",
      AlarmEvent::ItemRemoved(_) => "item_removed",
      AlarmEvent::ItemUpdated(_) => "item_updated",
    }
  }
}

struct Registration {
  id: ListenerId,
  listener: Arc<dyn AlarmClientListener>,
  active: AtomicBool,
  /// Held for the duration of each call into the listener.
  delivery: ReentrantMutex<()>,
}

#[derive(Default)]
pub struct ListenerRegistry {
  next_id: AtomicU64,
  registrations: Mutex<Arc<Vec<Arc<Registration>>>>,
}

impl std::fmt::Debug for ListenerRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ListenerRegistry")
      .field("listeners", &self.len())
      .finish()
  }
}

impl ListenerRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&self, listener: Arc<dyn AlarmClientListener>) -> ListenerId {
    let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
    let registration = Arc::new(Registration {
      id,
      listener,
      active: AtomicBool::new(true),
      delivery: ReentrantMutex::new(()),
    });

    let mut registrations = self.registrations.lock();
    let mut next = Vec::with_capacity(registrations.len() + 1);
    next.extend(registrations.iter().cloned());
    next.push(registration);
    *registrations = Arc::new(next);
    id
  }

  pub fn remove(&self, id: ListenerId) -> Result<()> {
    let removed = {
      let mut registrations = self.registrations.lock();
      let Some(index) = registrations.iter().position(|entry| entry.id == id) else {
        return Err(AlarmError::UnknownListener);
      };
      let removed = Arc::clone(&registrations[index]);
      removed.active.store(false, Ordering::Release);

      let next = registrations
        .iter()
        .filter(|entry| entry.id != id)
        .cloned()
        .collect();
      *registrations = Arc::new(next);
      removed
    };

    // Reentrant, so a listener removing itself does not block here.
    drop(removed.delivery.lock());
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.registrations.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn notify(&self, event: &AlarmEvent) {
    let snapshot: Arc<Vec<Arc<Registration>>> = self.registrations.lock().clone();
    for registration in snapshot.iter() {
      let _delivering = registration.delivery.lock();
      if !registration.active.load(Ordering::Acquire) {
        continue;
      }
      let delivered = catch_unwind(AssertUnwindSafe(|| {
        event.deliver(registration.listener.as_ref());
      }));
      if delivered.is_err() {
        tracing::error!(
          listener = registration.id.raw(),
          event = event.name(),
          "alarm client listener panicked"
        );
      }
    }
  }

  pub fn notify_all(&self, events: &[AlarmEvent]) {
    for event in events {
      self.notify(event);
    }
  }
}
