//! Arena-backed alarm tree.
//!
//! Items live in a single map keyed by [`ItemId`]. A node owns its children
//! through its child index; detaching an item from that index drops the item
//! and its whole subtree. The `parent` id on each entry is only used for
//! lookups and never drives removal.

use hashbrown::HashMap;
use indexmap::IndexMap;

use super::config::{replace_if_changed, ItemConfig, LeafConfig};
use super::path::AlarmTreePath;
use super::severity::SeverityLevel;
use super::state::{BasicState, ClientState};
use crate::error::{AlarmError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
  pub const fn raw(self) -> u64 {
    self.0
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
  Node {
    state: BasicState,
  },
  Leaf {
    state: ClientState,
    config: LeafConfig,
  },
}

/// Immutable view of one tree item, handed to listeners and query callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmTreeItem {
  pub id: ItemId,
  pub path: AlarmTreePath,
  pub parent: Option<ItemId>,
  pub config: ItemConfig,
  pub kind: ItemKind,
}

impl AlarmTreeItem {
  pub fn name(&self) -> &str {
    self.path.name().unwrap_or_default()
  }

  pub fn path_name(&self) -> String {
    self.path.to_string()
  }

  pub fn is_leaf(&self) -> bool {
    matches!(self.kind, ItemKind::Leaf { .. })
  }

  pub fn severity(&self) -> SeverityLevel {
    match &self.kind {
      ItemKind::Node { state } => state.severity,
      ItemKind::Leaf { state, .. } => state.severity,
    }
  }

  pub fn client_state(&self) -> Option<&ClientState> {
    match &self.kind {
      ItemKind::Leaf { state, .. } => Some(state),
      ItemKind::Node { .. } => None,
    }
  }

  pub fn leaf_config(&self) -> Option<&LeafConfig> {
    match &self.kind {
      ItemKind::Leaf { config, .. } => Some(config),
      ItemKind::Node { .. } => None,
    }
  }
}

#[derive(Debug)]
enum EntryBody {
  Node {
    state: BasicState,
    children: IndexMap<String, ItemId>,
  },
  Leaf {
    state: ClientState,
    config: LeafConfig,
  },
}

#[derive(Debug)]
struct TreeEntry {
  path: AlarmTreePath,
  parent: Option<ItemId>,
  config: ItemConfig,
  body: EntryBody,
}

impl TreeEntry {
  fn child(&self, name: &str) -> Option<ItemId> {
    match &self.body {
      EntryBody::Node { children, .. } => children.get(name).copied(),
      EntryBody::Leaf { .. } => None,
    }
  }

  fn is_leaf(&self) -> bool {
    matches!(self.body, EntryBody::Leaf { .. })
  }
}

#[derive(Debug)]
pub struct AlarmTree {
  root: ItemId,
  next_id: u64,
  entries: HashMap<ItemId, TreeEntry>,
}

impl AlarmTree {
  pub fn new(root_name: &str) -> Self {
    let root = ItemId(0);
    let mut entries = HashMap::new();
    entries.insert(
      root,
      TreeEntry {
        path: AlarmTreePath::from_segments([root_name]),
        parent: None,
        config: ItemConfig::default(),
        body: EntryBody::Node {
          state: BasicState::default(),
          children: IndexMap::new(),
        },
      },
    );
    Self {
      root,
      next_id: 1,
      entries,
    }
  }

  pub fn root(&self) -> ItemId {
    self.root
  }

  pub fn root_name(&self) -> &str {
    self
      .entries
      .get(&self.root)
      .and_then(|entry| entry.path.root_name())
      .unwrap_or_default()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn is_leaf(&self, id: ItemId) -> bool {
    self.entries.get(&id).is_some_and(TreeEntry::is_leaf)
  }

  pub fn snapshot(&self, id: ItemId) -> Option<AlarmTreeItem> {
    let entry = self.entries.get(&id)?;
    let kind = match &entry.body {
      EntryBody::Node { state, .. } => ItemKind::Node { state: *state },
      EntryBody::Leaf { state, config } => ItemKind::Leaf {
        state: state.clone(),
        config: config.clone(),
      },
    };
    Some(AlarmTreeItem {
      id,
      path: entry.path.clone(),
      parent: entry.parent,
      config: entry.config.clone(),
      kind,
    })
  }

  pub fn path_of(&self, id: ItemId) -> Option<&AlarmTreePath> {
    self.entries.get(&id).map(|entry| &entry.path)
  }

  /// Children of `id` in insertion order; empty for leaves.
  pub fn children(&self, id: ItemId) -> Vec<ItemId> {
    match self.entries.get(&id).map(|entry| &entry.body) {
      Some(EntryBody::Node { children, .. }) => children.values().copied().collect(),
      _ => Vec::new(),
    }
  }

  fn check_root(&self, path: &AlarmTreePath) -> Result<()> {
    if path.root_name() != Some(self.root_name()) {
      return Err(AlarmError::InvalidPath {
        root: self.root_name().to_string(),
        path: path.to_string(),
      });
    }
    Ok(())
  }

  /// Resolve an existing item.
  ///
  /// Fails when the path does not start at the root; returns `None` when any
  /// segment is unknown.
  pub fn find(&self, path: &AlarmTreePath) -> Result<Option<ItemId>> {
    self.check_root(path)?;

    let mut current = self.root;
    for name in &path.segments()[1..] {
      let Some(entry) = self.entries.get(&current) else {
        return Ok(None);
      };
      match entry.child(name) {
        Some(child) => current = child,
        None => return Ok(None),
      }
    }
    Ok(Some(current))
  }

  /// Resolve an item, creating it and any missing intermediate nodes.
  ///
  /// Newly created ids are appended to `created` from the top down. The final
  /// segment becomes a leaf when `is_leaf` is set and it did not exist yet.
  pub fn find_or_create(
    &mut self,
    path: &AlarmTreePath,
    is_leaf: bool,
    created: &mut Vec<ItemId>,
  ) -> Result<ItemId> {
    self.check_root(path)?;

    let segments = path.segments();
    let mut parent = self.root;
    for (index, name) in segments.iter().enumerate().skip(1) {
      let last = index == segments.len() - 1;
      let existing = self.entries.get(&parent).and_then(|entry| entry.child(name));
      let item = match existing {
        Some(item) => item,
        None => {
          let item = self.insert_child(parent, name, last && is_leaf)?;
          created.push(item);
          item
        }
      };

      if last {
        return Ok(item);
      }
      if self.is_leaf(item) {
        return Err(AlarmError::PathThroughLeaf {
          name: name.clone(),
          path: path.to_string(),
        });
      }
      parent = item;
    }

    Ok(parent)
  }

  fn insert_child(&mut self, parent: ItemId, name: &str, is_leaf: bool) -> Result<ItemId> {
    let id = ItemId(self.next_id);
    let root = self.root_name().to_string();
    let parent_entry = self
      .entries
      .get_mut(&parent)
      .ok_or_else(|| AlarmError::InvalidPath {
        root,
        path: name.to_string(),
      })?;
    let path = parent_entry.path.child(name);
    let parent_name = parent_entry.path.name().unwrap_or_default().to_string();
    let EntryBody::Node { children, .. } = &mut parent_entry.body else {
      return Err(AlarmError::PathThroughLeaf {
        name: parent_name,
        path: path.to_string(),
      });
    };
    children.insert(name.to_string(), id);
    self.next_id += 1;

    let body = if is_leaf {
      EntryBody::Leaf {
        state: ClientState::default(),
        config: LeafConfig::default(),
      }
    } else {
      EntryBody::Node {
        state: BasicState::default(),
        children: IndexMap::new(),
      }
    };
    self.entries.insert(
      id,
      TreeEntry {
        path,
        parent: Some(parent),
        config: ItemConfig::default(),
        body,
      },
    );
    Ok(id)
  }

  /// Detach `id` from its parent, dropping it together with its subtree.
  ///
  /// Returns the snapshot of the detached item. The root cannot be detached.
  pub fn detach(&mut self, id: ItemId) -> Option<AlarmTreeItem> {
    let parent = self.entries.get(&id)?.parent?;
    let removed = self.snapshot(id)?;

    if let Some(EntryBody::Node { children, .. }) =
      self.entries.get_mut(&parent).map(|entry| &mut entry.body)
    {
      children.shift_remove(removed.name());
    }

    let mut pending = vec![id];
    while let Some(current) = pending.pop() {
      if let Some(entry) = self.entries.remove(&current) {
        if let EntryBody::Node { children, .. } = entry.body {
          pending.extend(children.into_values());
        }
      }
    }

    Some(removed)
  }

  /// Paths of `id` and all its descendants, children before their parent.
  pub fn post_order_paths(&self, id: ItemId) -> Vec<AlarmTreePath> {
    let mut paths = Vec::new();
    self.collect_post_order(id, &mut paths);
    paths
  }

  fn collect_post_order(&self, id: ItemId, paths: &mut Vec<AlarmTreePath>) {
    for child in self.children(id) {
      self.collect_post_order(child, paths);
    }
    if let Some(path) = self.path_of(id) {
      paths.push(path.clone());
    }
  }

  pub fn set_item_config(&mut self, id: ItemId, config: ItemConfig) -> bool {
    match self.entries.get_mut(&id) {
      Some(entry) => replace_if_changed(&mut entry.config, config),
      None => false,
    }
  }

  /// Apply leaf settings; a node ignores them.
  pub fn set_leaf_config(&mut self, id: ItemId, value: LeafConfig) -> bool {
    match self.entries.get_mut(&id).map(|entry| &mut entry.body) {
      Some(EntryBody::Leaf { config, .. }) => replace_if_changed(config, value),
      _ => false,
    }
  }

  pub fn set_leaf_state(&mut self, id: ItemId, value: ClientState) -> bool {
    match self.entries.get_mut(&id).map(|entry| &mut entry.body) {
      Some(EntryBody::Leaf { state, .. }) => replace_if_changed(state, value),
      _ => false,
    }
  }

  pub fn set_node_state(&mut self, id: ItemId, value: BasicState) -> bool {
    match self.entries.get_mut(&id).map(|entry| &mut entry.body) {
      Some(EntryBody::Node { state, .. }) => replace_if_changed(state, value),
      _ => false,
    }
  }
}
