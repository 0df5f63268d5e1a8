use crate::rulekey::RuleKey;

use super::{Artifact, ArtifactCache, CacheError};

/// A cache that never hits and discards everything stored.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl ArtifactCache for NoopCache {
  fn probe(&self, _key: &RuleKey) -> Result<bool, CacheError> {
    Ok(false)
  }

  fn fetch(&self, key: &RuleKey) -> Result<Artifact, CacheError> {
    Err(CacheError::Miss(key.clone()))
  }

  fn store(&self, _key: &RuleKey, _artifact: &Artifact) -> Result<(), CacheError> {
    Ok(())
  }
}
