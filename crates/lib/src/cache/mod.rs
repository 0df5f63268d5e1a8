//! Artifact cache collaborator.
//!
//! The build engine stores the output of every cacheable rule it builds under
//! the rule's key and probes for it before building again. Implementations
//! must never report a partially written entry as a hit.

mod artifact;
mod dir;
mod noop;

pub use artifact::Artifact;
pub use dir::{ArtifactKind, CacheMarker, DirCache};
pub use noop::NoopCache;

use std::path::PathBuf;

use thiserror::Error;

use crate::rulekey::RuleKey;

pub trait ArtifactCache: Send + Sync {
  /// Whether a complete entry exists for `key`.
  fn probe(&self, key: &RuleKey) -> Result<bool, CacheError>;

  fn fetch(&self, key: &RuleKey) -> Result<Artifact, CacheError>;

  fn store(&self, key: &RuleKey, artifact: &Artifact) -> Result<(), CacheError>;
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
  #[error("cache I/O error at {path}: {message}")]
  Io { path: PathBuf, message: String },

  #[error("no cache entry for {0}")]
  Miss(RuleKey),

  #[error("cache entry {key} is corrupt: expected {expected}, found {actual}")]
  Corrupt {
    key: RuleKey,
    expected: String,
    actual: String,
  },

  #[error("invalid cache marker at {path}: {message}")]
  Marker { path: PathBuf, message: String },
}

impl CacheError {
  fn io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
    CacheError::Io {
      path: path.into(),
      message: err.to_string(),
    }
  }
}
