use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::target::{BuildTarget, ParseTargetError};

/// An input of a rule: either a file checked into the project, or the output
/// of another rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourcePath {
  Path(PathBuf),
  Target(BuildTarget),
}

impl SourcePath {
  /// Strings containing `//` name a target, everything else is a project-relative path.
  pub fn parse(raw: &str) -> Result<Self, ParseTargetError> {
    if raw.contains("//") {
      Ok(Self::Target(BuildTarget::parse(raw)?))
    } else {
      Ok(Self::Path(PathBuf::from(raw)))
    }
  }

  pub fn as_target(&self) -> Option<&BuildTarget> {
    match self {
      Self::Target(target) => Some(target),
      Self::Path(_) => None,
    }
  }

  pub fn as_path(&self) -> Option<&Path> {
    match self {
      Self::Path(path) => Some(path),
      Self::Target(_) => None,
    }
  }
}

impl From<&str> for SourcePath {
  fn from(raw: &str) -> Self {
    Self::parse(raw).unwrap_or_else(|_| Self::Path(PathBuf::from(raw)))
  }
}

impl fmt::Display for SourcePath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Path(path) => write!(f, "{}", path.display()),
      Self::Target(target) => write!(f, "{}", target),
    }
  }
}

impl Serialize for SourcePath {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for SourcePath {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Self::parse(&raw).map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn distinguishes_paths_from_targets() {
    assert_eq!(
      SourcePath::parse("src/Main.java").unwrap(),
      SourcePath::Path(PathBuf::from("src/Main.java"))
    );
    assert_eq!(
      SourcePath::parse("//gen:sources").unwrap(),
      SourcePath::Target(BuildTarget::parse("//gen:sources").unwrap())
    );
  }

  #[test]
  fn malformed_target_is_an_error() {
    assert!(SourcePath::parse("//gen").is_err());
  }
}
