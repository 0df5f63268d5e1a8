use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rule::SourcePath;
use crate::target::BuildTarget;
use crate::util::hash::ContentHash;

/// Fingerprint of a rule: a 64-character lowercase SHA-256 hex digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleKey(pub String);

impl fmt::Display for RuleKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A typed rule key input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValue {
  /// An unset optional field. Distinct from every present value.
  Absent,
  Str(String),
  Int(i64),
  Bool(bool),
  /// File contents only; the path itself does not contribute.
  File(PathBuf),
  /// File contents plus the name it is packaged under.
  NamedFile { name: String, path: PathBuf },
  /// The rule key of a dependency.
  Dep(BuildTarget),
  /// A dependency's identity and declared output path, ignoring its content.
  Stringified(BuildTarget),
  /// Content hash of a dependency's built output.
  BuiltOutput(BuildTarget),
  /// Ordered sequence.
  List(Vec<KeyValue>),
  /// Unordered collection; element order never changes the key.
  Set(Vec<KeyValue>),
  Map(BTreeMap<String, KeyValue>),
}

impl KeyValue {
  pub fn opt_str(value: Option<&str>) -> Self {
    value.map_or(Self::Absent, |v| Self::Str(v.to_string()))
  }

  pub fn strs<I, S>(values: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    Self::List(values.into_iter().map(|v| Self::Str(v.as_ref().to_string())).collect())
  }

  /// A file keyed by content and its own path as name.
  pub fn named_file(path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    Self::NamedFile {
      name: path.to_string_lossy().replace('\\', "/"),
      path,
    }
  }

  /// Content of a source: the file's bytes, or the producing rule's built
  /// output. The producer must be a dependency of the keyed rule.
  pub fn source(source: &SourcePath) -> Self {
    match source {
      SourcePath::Path(path) => Self::File(path.clone()),
      SourcePath::Target(target) => Self::BuiltOutput(target.clone()),
    }
  }

  pub fn opt_source(source: Option<&SourcePath>) -> Self {
    source.map_or(Self::Absent, Self::source)
  }

  /// Like [`KeyValue::source`], but the name counts too. A rule output is
  /// named by its producer and declared output path.
  pub fn named_source(source: &SourcePath) -> Self {
    match source {
      SourcePath::Path(path) => Self::named_file(path.clone()),
      SourcePath::Target(target) => Self::List(vec![
        Self::Stringified(target.clone()),
        Self::BuiltOutput(target.clone()),
      ]),
    }
  }

  pub fn sources<'a>(sources: impl IntoIterator<Item = &'a SourcePath>) -> Self {
    Self::Set(sources.into_iter().map(Self::source).collect())
  }

  pub fn named_sources<'a>(sources: impl IntoIterator<Item = &'a SourcePath>) -> Self {
    Self::Set(sources.into_iter().map(Self::named_source).collect())
  }

  pub fn deps<'a>(targets: impl IntoIterator<Item = &'a BuildTarget>) -> Self {
    Self::Set(targets.into_iter().cloned().map(Self::Dep).collect())
  }
}

/// Facts about a built dependency that key fields may fold in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepState {
  pub key: RuleKey,
  pub output: Option<PathBuf>,
  pub output_hash: ContentHash,
}

#[derive(Debug, Clone, Error)]
pub enum KeyError {
  #[error("input {path} of {target} cannot be read: {message}")]
  InputUnavailable {
    target: BuildTarget,
    path: PathBuf,
    message: String,
  },

  #[error("{target} references {dep} in its rule key before {dep} is built")]
  DependencyNotReady { target: BuildTarget, dep: BuildTarget },
}
