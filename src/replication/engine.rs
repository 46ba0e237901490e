//! Apply config/state records to the replicated alarm tree.
//!
//! The engine is the only writer of the tree, the deletion marks and the
//! server mode flags. Tree edits happen under the write lock; listeners are
//! notified after the lock is released so they may query the replica.

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::deletion::DeletionTracker;
use super::listener::{AlarmEvent, ListenerRegistry};
use super::liveness::LivenessMonitor;
use super::{CONFIG_PREFIX, STATE_PREFIX};
use crate::codec;
use crate::error::{AlarmError, Result};
use crate::model::{AlarmTree, AlarmTreeItem, AlarmTreePath, ItemId};
use crate::transport::LogRecord;

/// Split `type:path` at the first `:`. The type keeps its colon.
pub fn split_key(key: &str) -> Result<(&str, &str)> {
  let separator = key
    .find(':')
    .ok_or_else(|| AlarmError::InvalidKey(key.to_string()))?;
  Ok(key.split_at(separator + 1))
}

/// Replica state shared between the engine thread and synchronous callers.
#[derive(Debug)]
pub struct ReplicaContext {
  tree: RwLock<AlarmTree>,
  maintenance_mode: AtomicBool,
  disable_notify: AtomicBool,
  listeners: Arc<ListenerRegistry>,
}

impl ReplicaContext {
  pub fn new(root_name: &str) -> Self {
    Self {
      tree: RwLock::new(AlarmTree::new(root_name)),
      maintenance_mode: AtomicBool::new(false),
      disable_notify: AtomicBool::new(false),
      listeners: Arc::new(ListenerRegistry::new()),
    }
  }

  pub fn listeners(&self) -> &Arc<ListenerRegistry> {
    &self.listeners
  }

  pub fn is_maintenance_mode(&self) -> bool {
    self.maintenance_mode.load(Ordering::Acquire)
  }

  pub fn is_disable_notify(&self) -> bool {
    self.disable_notify.load(Ordering::Acquire)
  }

  pub fn root(&self) -> Option<AlarmTreeItem> {
    let tree = self.tree.read();
    tree.snapshot(tree.root())
  }

  pub fn find_node(&self, path: &AlarmTreePath) -> Result<Option<AlarmTreeItem>> {
    let tree = self.tree.read();
    Ok(tree.find(path)?.and_then(|id| tree.snapshot(id)))
  }

  /// Children of the item at `path`; `None` when the path is unknown.
  pub fn children(&self, path: &AlarmTreePath) -> Result<Option<Vec<AlarmTreeItem>>> {
    let tree = self.tree.read();
    let Some(id) = tree.find(path)? else {
      return Ok(None);
    };
    Ok(Some(
      tree
        .children(id)
        .into_iter()
        .filter_map(|child| tree.snapshot(child))
        .collect(),
    ))
  }

  /// Paths below and including `path`, children before their parent.
  pub fn post_order_paths(&self, path: &AlarmTreePath) -> Result<Vec<AlarmTreePath>> {
    let tree = self.tree.read();
    Ok(
      tree
        .find(path)?
        .map(|id| tree.post_order_paths(id))
        .unwrap_or_default(),
    )
  }

  pub fn item_count(&self) -> usize {
    self.tree.read().len()
  }

  /// Run `read` against a consistent view of the tree.
  pub fn with_tree<R>(&self, read: impl FnOnce(&AlarmTree) -> R) -> R {
    read(&self.tree.read())
  }
}

#[derive(Debug)]
pub struct ReplicationEngine {
  context: Arc<ReplicaContext>,
  deleted: DeletionTracker,
  liveness: LivenessMonitor,
}

impl ReplicationEngine {
  pub fn new(context: Arc<ReplicaContext>, idle_timeout: Duration) -> Self {
    Self {
      context,
      deleted: DeletionTracker::new(),
      liveness: LivenessMonitor::new(idle_timeout),
    }
  }

  pub fn context(&self) -> &Arc<ReplicaContext> {
    &self.context
  }

  pub fn deletion_tracker(&self) -> &DeletionTracker {
    &self.deleted
  }

  pub fn apply_batch(&mut self, records: &[LogRecord]) {
    for record in records {
      self.handle_record(&record.key, record.value.as_deref());
    }
  }

  /// Apply one record. A bad record is logged and skipped.
  pub fn handle_record(&mut self, key: &str, value: Option<&str>) {
    tracing::debug!(key, value = value.unwrap_or("<tombstone>"), "alarm record");
    let mut events = Vec::new();
    if let Err(error) = self.process(key, value, &mut events) {
      tracing::warn!(
        key,
        payload = value.unwrap_or("<tombstone>"),
        error = %error,
        "alarm config update error"
      );
    }
    self.context.listeners.notify_all(&events);
  }

  /// Fire `server_state_changed` when the upstream went silent or came back.
  pub fn check_liveness(&mut self, now: Instant) {
    if let Some(alive) = self.liveness.check(now) {
      if alive {
        tracing::info!("alarm server state updates resumed");
      } else {
        tracing::warn!(
          threshold = ?self.liveness.threshold(),
          "no alarm server state updates"
        );
      }
      self.context.listeners.notify(&AlarmEvent::ServerState(alive));
    }
  }

  fn process(
    &mut self,
    key: &str,
    value: Option<&str>,
    events: &mut Vec<AlarmEvent>,
  ) -> Result<()> {
    let (kind, raw_path) = split_key(key)?;
    let path = AlarmTreePath::parse(raw_path);
    match kind {
      CONFIG_PREFIX => match value {
        None => self.delete_item(path, events),
        Some(text) => self.update_config(&path, text, events),
      },
      STATE_PREFIX => self.update_state(&path, key, value, events),
      _ => Ok(()),
    }
  }

  fn delete_item(&mut self, path: AlarmTreePath, events: &mut Vec<AlarmEvent>) -> Result<()> {
    let mut tree = self.context.tree.write();
    let Some(id) = tree.find(&path)? else {
      tracing::debug!(path = %path, "tombstone for unknown item");
      self.deleted.mark(path);
      return Ok(());
    };
    if id == tree.root() {
      tracing::warn!(path = %path, "ignoring tombstone for the alarm tree root");
      return Ok(());
    }
    self.deleted.mark(path.clone());
    if let Some(removed) = tree.detach(id) {
      tracing::debug!(path = %path, "delete");
      events.push(AlarmEvent::ItemRemoved(removed));
    }
    Ok(())
  }

  fn update_config(
    &mut self,
    path: &AlarmTreePath,
    text: &str,
    events: &mut Vec<AlarmEvent>,
  ) -> Result<()> {
    let json = codec::parse_payload(text)?;
    if codec::is_state_update(&json) {
      tracing::warn!(path = %path, payload = text, "config update with state content");
      return Ok(());
    }
    if codec::is_deletion_marker(&json) {
      let user = json.get(codec::tags::USER).and_then(Value::as_str).unwrap_or_default();
      let host = json.get(codec::tags::HOST).and_then(Value::as_str).unwrap_or_default();
      tracing::debug!(path = %path, user, host, "item about to be deleted");
      return Ok(());
    }

    let path_name = path.to_string();
    let item_config = codec::parse_item_config(&json, &path_name)?;
    let leaf_config = codec::parse_leaf_config(&json, &path_name)?;

    let mut tree = self.context.tree.write();
    let (id, created) =
      resolve_or_create(&mut tree, path, codec::is_leaf_config_or_state(&json), events)?;
    self.deleted.clear(path);

    let mut changed = tree.set_item_config(id, item_config);
    if let Some(leaf_config) = leaf_config {
      changed |= tree.set_leaf_config(id, leaf_config);
    }
    if changed || created {
      push_update(&tree, id, events);
    }
    Ok(())
  }

  fn update_state(
    &mut self,
    path: &AlarmTreePath,
    key: &str,
    value: Option<&str>,
    events: &mut Vec<AlarmEvent>,
  ) -> Result<()> {
    let Some(text) = value else {
      tracing::warn!(key, "state update with null content");
      return Ok(());
    };
    let json = codec::parse_payload(text)?;
    if !codec::is_state_update(&json) {
      tracing::warn!(key, payload = text, "state update with config content");
      return Ok(());
    }
    if self.deleted.contains(path) {
      tracing::debug!(key, "ignoring state for deleted item");
      return Ok(());
    }

    let path_name = path.to_string();
    let is_leaf = codec::is_leaf_config_or_state(&json);
    let client_state = if is_leaf {
      codec::parse_client_state(&json, &path_name)?
    } else {
      None
    };
    let node_state = codec::parse_node_state(&json, &path_name)?;

    let mut tree = self.context.tree.write();
    let (id, created) = resolve_or_create(&mut tree, path, is_leaf, events)?;

    let maintenance_mode = codec::is_maintenance_mode(&json);
    if self
      .context
      .maintenance_mode
      .swap(maintenance_mode, Ordering::AcqRel)
      != maintenance_mode
    {
      events.push(AlarmEvent::ServerMode(maintenance_mode));
    }
    let disable_notify = codec::is_disable_notify(&json);
    if self
      .context
      .disable_notify
      .swap(disable_notify, Ordering::AcqRel)
      != disable_notify
    {
      events.push(AlarmEvent::ServerDisableNotify(disable_notify));
    }

    let changed = if tree.is_leaf(id) {
      client_state.is_some_and(|state| tree.set_leaf_state(id, state))
    } else {
      node_state.is_some_and(|state| tree.set_node_state(id, state))
    };
    if changed || created {
      push_update(&tree, id, events);
    }

    self.liveness.record_state_update(Instant::now());
    Ok(())
  }
}

/// Returns the item id and whether the item itself was just created.
fn resolve_or_create(
  tree: &mut AlarmTree,
  path: &AlarmTreePath,
  is_leaf: bool,
  events: &mut Vec<AlarmEvent>,
) -> Result<(ItemId, bool)> {
  if let Some(id) = tree.find(path)? {
    return Ok((id, false));
  }

  let mut created = Vec::new();
  let id = tree.find_or_create(path, is_leaf, &mut created)?;
  for item in &created {
    if let Some(snapshot) = tree.snapshot(*item) {
      tracing::debug!(path = %snapshot.path, leaf = snapshot.is_leaf(), "create");
      events.push(AlarmEvent::ItemAdded(snapshot));
    }
  }
  Ok((id, created.last() == Some(&id)))
}

fn push_update(tree: &AlarmTree, id: ItemId, events: &mut Vec<AlarmEvent>) {
  if let Some(snapshot) = tree.snapshot(id) {
    events.push(AlarmEvent::ItemUpdated(snapshot));
  }
}
