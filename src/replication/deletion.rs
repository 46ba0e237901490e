//! Tombstoned paths.
//!
//! A marked path suppresses every state record for it until a config record
//! for the same path is applied again. Marks never expire.

use hashbrown::HashSet;

use crate::model::AlarmTreePath;

#[derive(Debug, Default)]
pub struct DeletionTracker {
  paths: HashSet<AlarmTreePath>,
}

impl DeletionTracker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns `true` if the path was not marked yet.
  pub fn mark(&mut self, path: AlarmTreePath) -> bool {
    self.paths.insert(path)
  }

  /// Returns `true` if the path had been marked.
  pub fn clear(&mut self, path: &AlarmTreePath) -> bool {
    self.paths.remove(path)
  }

  pub fn contains(&self, path: &AlarmTreePath) -> bool {
    self.paths.contains(path)
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }
}
