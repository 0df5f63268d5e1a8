use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced while parsing a target or flavor string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseTargetError {
  #[error("invalid target '{input}': {reason}")]
  InvalidTarget { input: String, reason: String },

  #[error("invalid flavor '{0}': flavors are lowercase letters, digits, '_', '-' and '.'")]
  InvalidFlavor(String),
}

/// Name of the cell (repository root) a target lives in. Empty for the root cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(pub String);

impl CellId {
  pub fn root() -> Self {
    Self::default()
  }

  pub fn is_root(&self) -> bool {
    self.0.is_empty()
  }
}

impl fmt::Display for CellId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A qualifier requesting a derived view of a target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Flavor(Cow<'static, str>);

impl Flavor {
  /// Build a flavor from a compile-time name. The name is trusted to be valid.
  pub const fn from_static(name: &'static str) -> Self {
    Self(Cow::Borrowed(name))
  }

  pub fn new(name: &str) -> Result<Self, ParseTargetError> {
    let valid = !name.is_empty()
      && name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.'));
    if !valid {
      return Err(ParseTargetError::InvalidFlavor(name.to_string()));
    }
    Ok(Self(Cow::Owned(name.to_string())))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Flavor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Identity of a buildable unit.
///
/// Equality covers every field; flavors live in an ordered set so declaration
/// order never matters and the display form is canonical.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildTarget {
  cell: CellId,
  base_path: String,
  name: String,
  flavors: BTreeSet<Flavor>,
}

impl BuildTarget {
  pub fn new(cell: CellId, base_path: &str, name: &str) -> Self {
    Self {
      cell,
      base_path: base_path.trim_matches('/').to_string(),
      name: name.to_string(),
      flavors: BTreeSet::new(),
    }
  }

  /// Parse the canonical `cell//base/path:name#flavor,flavor` form.
  pub fn parse(input: &str) -> Result<Self, ParseTargetError> {
    let invalid = |reason: &str| ParseTargetError::InvalidTarget {
      input: input.to_string(),
      reason: reason.to_string(),
    };

    let (unflavored, flavor_part) = match input.split_once('#') {
      Some((head, tail)) => (head, Some(tail)),
      None => (input, None),
    };

    let Some((cell, rest)) = unflavored.split_once("//") else {
      return Err(invalid("expected '//' before the base path"));
    };
    if cell.contains(['/', ':']) {
      return Err(invalid("cell names cannot contain '/' or ':'"));
    }

    let Some((base_path, name)) = rest.rsplit_once(':') else {
      return Err(invalid("expected ':' before the short name"));
    };
    if name.is_empty() {
      return Err(invalid("short name is empty"));
    }
    if base_path.ends_with('/') || base_path.contains(':') {
      return Err(invalid("malformed base path"));
    }

    let mut flavors = BTreeSet::new();
    if let Some(flavor_part) = flavor_part {
      for raw in flavor_part.split(',') {
        flavors.insert(Flavor::new(raw)?);
      }
    }

    Ok(Self {
      cell: CellId(cell.to_string()),
      base_path: base_path.to_string(),
      name: name.to_string(),
      flavors,
    })
  }

  pub fn cell(&self) -> &CellId {
    &self.cell
  }

  pub fn base_path(&self) -> &str {
    &self.base_path
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn flavors(&self) -> &BTreeSet<Flavor> {
    &self.flavors
  }

  pub fn is_flavored(&self) -> bool {
    !self.flavors.is_empty()
  }

  pub fn has_flavor(&self, flavor: &Flavor) -> bool {
    self.flavors.contains(flavor)
  }

  /// The default view of this target: same cell, path and name, no flavors.
  pub fn unflavored(&self) -> Self {
    Self {
      flavors: BTreeSet::new(),
      ..self.clone()
    }
  }

  pub fn with_flavors(&self, flavors: impl IntoIterator<Item = Flavor>) -> Self {
    Self {
      flavors: flavors.into_iter().collect(),
      ..self.clone()
    }
  }

  pub fn with_appended_flavor(&self, flavor: Flavor) -> Self {
    let mut target = self.clone();
    target.flavors.insert(flavor);
    target
  }

  pub fn without_flavor(&self, flavor: &Flavor) -> Self {
    let mut target = self.clone();
    target.flavors.remove(flavor);
    target
  }

  /// `cell//base/path:name` without any flavors.
  pub fn unflavored_name(&self) -> String {
    format!("{}//{}:{}", self.cell, self.base_path, self.name)
  }

  /// Short name with flavors appended, used for generated directory names.
  pub fn short_name_with_flavors(&self) -> String {
    if self.flavors.is_empty() {
      self.name.clone()
    } else {
      format!("{}#{}", self.name, self.flavor_list())
    }
  }

  fn flavor_list(&self) -> String {
    self.flavors.iter().map(Flavor::as_str).collect::<Vec<_>>().join(",")
  }
}

impl fmt::Display for BuildTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.unflavored_name())?;
    if !self.flavors.is_empty() {
      write!(f, "#{}", self.flavor_list())?;
    }
    Ok(())
  }
}

impl FromStr for BuildTarget {
  type Err = ParseTargetError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl Serialize for BuildTarget {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for BuildTarget {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Self::parse(&raw).map_err(serde::de::Error::custom)
  }
}
