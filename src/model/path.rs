//! Alarm tree path parsing and formatting.
//!
//! Paths are `/`-separated name segments whose first segment is the root
//! (configuration) name, e.g. `/Accelerator/Vacuum/PV1`. A leading `/` is
//! optional on input. A literal `/` inside a name is written as `\/` and a
//! literal `\` as `\\`; any other backslash is kept as is.

use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = '/';
const ESCAPE: char = '\\';

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AlarmTreePath {
  segments: Vec<String>,
}

impl AlarmTreePath {
  pub fn from_segments<I, S>(segments: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      segments: segments
        .into_iter()
        .map(Into::<String>::into)
        .filter(|segment| !segment.is_empty())
        .collect(),
    }
  }

  /// Split a textual path into segments. Empty segments are dropped.
  pub fn parse(raw: &str) -> Self {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
      match ch {
        ESCAPE if matches!(chars.peek(), Some(&SEPARATOR) | Some(&ESCAPE)) => {
          if let Some(escaped) = chars.next() {
            current.push(escaped);
          }
        }
        SEPARATOR => {
          if !current.is_empty() {
            segments.push(std::mem::take(&mut current));
          }
        }
        other => current.push(other),
      }
    }
    if !current.is_empty() {
      segments.push(current);
    }

    Self { segments }
  }

  /// Path of `name` below this path.
  pub fn child(&self, name: &str) -> Self {
    let mut segments = self.segments.clone();
    if !name.is_empty() {
      segments.push(name.to_string());
    }
    Self { segments }
  }

  pub fn parent(&self) -> Option<Self> {
    if self.segments.len() <= 1 {
      return None;
    }
    Some(Self {
      segments: self.segments[..self.segments.len() - 1].to_vec(),
    })
  }

  pub fn segments(&self) -> &[String] {
    &self.segments
  }

  pub fn root_name(&self) -> Option<&str> {
    self.segments.first().map(String::as_str)
  }

  /// Last segment, the item's own name.
  pub fn name(&self) -> Option<&str> {
    self.segments.last().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.segments.len()
  }

  pub fn is_empty(&self) -> bool {
    self.segments.is_empty()
  }

  pub fn starts_with(&self, prefix: &AlarmTreePath) -> bool {
    self.segments.starts_with(&prefix.segments)
  }
}

/// Join a parent path and a new item name, as used when publishing new items.
pub fn make_path(parent: &str, name: &str) -> AlarmTreePath {
  AlarmTreePath::parse(parent).child(name)
}

fn escape_segment(segment: &str) -> String {
  let mut escaped = String::with_capacity(segment.len());
  for ch in segment.chars() {
    if ch == SEPARATOR || ch == ESCAPE {
      escaped.push(ESCAPE);
    }
    escaped.push(ch);
  }
  escaped
}

impl fmt::Display for AlarmTreePath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.segments.is_empty() {
      return write!(f, "{SEPARATOR}");
    }
    for segment in &self.segments {
      write!(f, "{SEPARATOR}{}", escape_segment(segment))?;
    }
    Ok(())
  }
}

impl FromStr for AlarmTreePath {
  type Err = std::convert::Infallible;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    Ok(Self::parse(raw))
  }
}

impl From<&AlarmTreePath> for AlarmTreePath {
  fn from(path: &AlarmTreePath) -> Self {
    path.clone()
  }
}

impl From<&str> for AlarmTreePath {
  fn from(raw: &str) -> Self {
    Self::parse(raw)
  }
}

impl From<String> for AlarmTreePath {
  fn from(raw: String) -> Self {
    Self::parse(&raw)
  }
}

#[cfg(test)]
mod tests {
  use super::{make_path, AlarmTreePath};

  #[test]
  fn leading_separator_is_optional() {
    assert_eq!(
      AlarmTreePath::parse("Acc/Group1/PV1"),
      AlarmTreePath::parse("/Acc/Group1/PV1")
    );
    assert_eq!(
      AlarmTreePath::parse("Acc/Group1/PV1").to_string(),
      "/Acc/Group1/PV1"
    );
  }

  #[test]
  fn escaped_separator_stays_in_name() {
    let path = AlarmTreePath::parse("/Acc/Vac\\/Pump/PV");
    assert_eq!(path.segments(), ["Acc", "Vac/Pump", "PV"]);
    assert_eq!(path.to_string(), "/Acc/Vac\\/Pump/PV");
    assert_eq!(AlarmTreePath::parse(&path.to_string()), path);
  }

  #[test]
  fn trailing_backslash_does_not_merge_segments() {
    let path = AlarmTreePath::from_segments(["Acc", "Dir\\", "PV"]);
    assert_eq!(path.to_string(), "/Acc/Dir\\\\/PV");
    assert_eq!(AlarmTreePath::parse(&path.to_string()), path);

    let plain = AlarmTreePath::parse("/Acc/a\\b");
    assert_eq!(plain.segments(), ["Acc", "a\\b"]);
    assert_eq!(AlarmTreePath::parse(&plain.to_string()), plain);
  }

  #[test]
  fn empty_segments_are_dropped() {
    let path = AlarmTreePath::parse("//Acc///Group1/");
    assert_eq!(path.segments(), ["Acc", "Group1"]);
    assert!(AlarmTreePath::parse("").is_empty());
    assert_eq!(AlarmTreePath::parse("").to_string(), "/");
  }

  #[test]
  fn parent_and_child_navigation() {
    let path = make_path("/Acc/Group1", "PV1");
    assert_eq!(path.name(), Some("PV1"));
    assert_eq!(path.root_name(), Some("Acc"));
    assert_eq!(path.parent(), Some(AlarmTreePath::parse("/Acc/Group1")));
    assert_eq!(AlarmTreePath::parse("/Acc").parent(), None);
    assert!(path.starts_with(&AlarmTreePath::parse("Acc/Group1")));
    assert!(!path.starts_with(&AlarmTreePath::parse("Acc/Group2")));
  }
}
