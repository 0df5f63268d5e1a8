//! Content-addressed rule keys.
//!
//! A rule key fingerprints everything that can change a rule's output: its
//! type, its target, and each declared key field in schema order. Equal keys
//! mean interchangeable outputs, which is what lets the build engine skip work
//! and share artifacts through a cache.
//!
//! Field encoding is labeled and length-prefixed so adjacent values can never
//! run together, and every key starts with [`KEY_SCHEMA_VERSION`] so a change to
//! the encoding invalidates old cache entries instead of aliasing them.
//!
//! [`KEY_SCHEMA_VERSION`]: crate::consts::KEY_SCHEMA_VERSION

mod encode;
mod types;

pub use types::*;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::fs::ContentReader;
use crate::rule::Rule;
use crate::target::BuildTarget;
use crate::util::hash::ContentHash;

use encode::KeyEncoder;

/// Computes rule keys, memoizing file hashes and finished keys for the
/// lifetime of one build.
pub struct RuleKeyEngine {
  reader: Arc<dyn ContentReader>,
  file_hashes: DashMap<PathBuf, ContentHash>,
  keys: DashMap<BuildTarget, RuleKey>,
  computations: AtomicUsize,
}

impl RuleKeyEngine {
  pub fn new(reader: Arc<dyn ContentReader>) -> Self {
    Self {
      reader,
      file_hashes: DashMap::new(),
      keys: DashMap::new(),
      computations: AtomicUsize::new(0),
    }
  }

  /// Compute the key of `rule`.
  ///
  /// Every target referenced by a key field must already be present in `deps`;
  /// keys are only computed once a rule's dependencies are built.
  pub fn compute_key(&self, rule: &Rule, deps: &HashMap<BuildTarget, DepState>) -> Result<RuleKey, KeyError> {
    if let Some(key) = self.keys.get(&rule.target) {
      return Ok(key.clone());
    }

    let mut encoder = KeyEncoder::new(&rule.target, deps, self);
    encoder.header();
    encoder.field("rule_type", &KeyValue::Str(rule.rule_type.to_string()))?;
    encoder.field("target", &KeyValue::Str(rule.target.to_string()))?;
    for (name, value) in &rule.key_fields {
      encoder.field(name, value)?;
    }

    let key = RuleKey(format!("{:x}", Sha256::digest(encoder.finish())));
    self.computations.fetch_add(1, Ordering::Relaxed);
    debug!(rule = %rule.target, key = %key, "computed rule key");

    self.keys.insert(rule.target.clone(), key.clone());
    Ok(key)
  }

  /// Memoized key for `target`, if one was computed.
  pub fn cached_key(&self, target: &BuildTarget) -> Option<RuleKey> {
    self.keys.get(target).map(|k| k.clone())
  }

  /// Number of keys actually computed (memo hits excluded).
  pub fn computations(&self) -> usize {
    self.computations.load(Ordering::Relaxed)
  }

  fn file_hash(&self, target: &BuildTarget, path: &Path) -> Result<ContentHash, KeyError> {
    if let Some(hash) = self.file_hashes.get(path) {
      return Ok(hash.clone());
    }
    let hash = self
      .reader
      .content_hash(path)
      .map_err(|e| KeyError::InputUnavailable {
        target: target.clone(),
        path: path.to_path_buf(),
        message: e.to_string(),
      })?;
    self.file_hashes.insert(path.to_path_buf(), hash.clone());
    Ok(hash)
  }
}
