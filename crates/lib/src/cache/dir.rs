use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::consts::CACHE_COMPLETE_MARKER;
use crate::rulekey::RuleKey;

use super::{Artifact, ArtifactCache, CacheError};

const MARKER_VERSION: u32 = 1;
const ARTIFACT_NAME: &str = "artifact";

/// Contents of the completion marker written into every finished entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMarker {
  pub version: u32,
  pub kind: ArtifactKind,
  /// [`Artifact::content_hash`] of the stored artifact.
  pub content_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
  Absent,
  File,
  Dir,
}

impl From<&Artifact> for ArtifactKind {
  fn from(artifact: &Artifact) -> Self {
    match artifact {
      Artifact::Absent => ArtifactKind::Absent,
      Artifact::File(_) => ArtifactKind::File,
      Artifact::Dir(_) => ArtifactKind::Dir,
    }
  }
}

/// On-disk cache: one directory per key under `<root>/<first two hex chars>/<key>/`.
///
/// Entries are assembled in a temporary sibling directory and renamed into
/// place with the marker already written, so a reader sees either nothing or
/// a complete entry.
#[derive(Debug)]
pub struct DirCache {
  root: PathBuf,
  staging_counter: AtomicU64,
}

impl DirCache {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      staging_counter: AtomicU64::new(0),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn entry_path(&self, key: &RuleKey) -> PathBuf {
    let shard = key.0.get(..2).unwrap_or("00");
    self.root.join(shard).join(&key.0)
  }

  fn read_marker(&self, entry: &Path) -> Result<Option<CacheMarker>, CacheError> {
    let marker_path = entry.join(CACHE_COMPLETE_MARKER);
    let content = match fs::read_to_string(&marker_path) {
      Ok(content) => content,
      Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(err) => return Err(CacheError::io(&marker_path, err)),
    };
    serde_json::from_str(&content).map(Some).map_err(|e| CacheError::Marker {
      path: marker_path,
      message: e.to_string(),
    })
  }

  fn staging_path(&self, key: &RuleKey) -> PathBuf {
    let n = self.staging_counter.fetch_add(1, Ordering::Relaxed);
    self
      .entry_path(key)
      .with_file_name(format!(".tmp-{}-{}-{n}", key.0, std::process::id()))
  }
}

impl ArtifactCache for DirCache {
  fn probe(&self, key: &RuleKey) -> Result<bool, CacheError> {
    let entry = self.entry_path(key);
    match self.read_marker(&entry) {
      Ok(marker) => Ok(marker.is_some_and(|m| m.version == MARKER_VERSION)),
      Err(err) => {
        debug!(key = %key, error = %err, "unreadable cache marker, treating as miss");
        Ok(false)
      }
    }
  }

  fn fetch(&self, key: &RuleKey) -> Result<Artifact, CacheError> {
    let entry = self.entry_path(key);
    let marker = self.read_marker(&entry)?.ok_or_else(|| CacheError::Miss(key.clone()))?;

    let artifact = match marker.kind {
      ArtifactKind::Absent => Artifact::Absent,
      ArtifactKind::File | ArtifactKind::Dir => Artifact::capture(&entry.join(ARTIFACT_NAME))?,
    };

    let actual = artifact.content_hash();
    if actual.0 != marker.content_hash || ArtifactKind::from(&artifact) != marker.kind {
      warn!(key = %key, expected = %marker.content_hash, actual = %actual, "corrupt cache entry");
      return Err(CacheError::Corrupt {
        key: key.clone(),
        expected: marker.content_hash,
        actual: actual.0,
      });
    }
    debug!(key = %key, bytes = artifact.size(), "fetched cache entry");
    Ok(artifact)
  }

  fn store(&self, key: &RuleKey, artifact: &Artifact) -> Result<(), CacheError> {
    let entry = self.entry_path(key);
    if self.probe(key)? {
      return Ok(());
    }

    let staging = self.staging_path(key);
    fs::create_dir_all(&staging).map_err(|e| CacheError::io(&staging, e))?;
    let result = write_entry(&staging, artifact).and_then(|()| {
      if entry.exists() {
        fs::remove_dir_all(&entry).map_err(|e| CacheError::io(&entry, e))?;
      }
      fs::rename(&staging, &entry).map_err(|e| CacheError::io(&entry, e))
    });

    if result.is_err() {
      let _ = fs::remove_dir_all(&staging);
      if self.probe(key)? {
        // Another writer finished the same entry first.
        return Ok(());
      }
    } else {
      debug!(key = %key, bytes = artifact.size(), "stored cache entry");
    }
    result
  }
}

fn write_entry(staging: &Path, artifact: &Artifact) -> Result<(), CacheError> {
  artifact.materialize(&staging.join(ARTIFACT_NAME))?;

  let marker = CacheMarker {
    version: MARKER_VERSION,
    kind: artifact.into(),
    content_hash: artifact.content_hash().0,
  };
  let marker_path = staging.join(CACHE_COMPLETE_MARKER);
  let content = serde_json::to_string(&marker).map_err(|e| CacheError::Marker {
    path: marker_path.clone(),
    message: e.to_string(),
  })?;
  fs::write(&marker_path, format!("{content}\n")).map_err(|e| CacheError::io(&marker_path, e))
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use super::*;
  use tempfile::tempdir;

  fn key(c: char) -> RuleKey {
    RuleKey(std::iter::repeat_n(c, 64).collect())
  }

  #[test]
  fn store_then_fetch() {
    let temp = tempdir().unwrap();
    let cache = DirCache::new(temp.path());
    let artifact = Artifact::Dir(BTreeMap::from([
      ("classes/A.class".to_string(), b"cafebabe".to_vec()),
      ("META-INF/MANIFEST.MF".to_string(), b"Manifest-Version: 1.0".to_vec()),
    ]));

    assert!(!cache.probe(&key('a')).unwrap());
    cache.store(&key('a'), &artifact).unwrap();

    assert!(cache.probe(&key('a')).unwrap());
    assert_eq!(cache.fetch(&key('a')).unwrap(), artifact);
    assert!(cache.entry_path(&key('a')).starts_with(temp.path().join("aa")));
  }

  #[test]
  fn absent_outputs_round_trip() {
    let temp = tempdir().unwrap();
    let cache = DirCache::new(temp.path());

    cache.store(&key('b'), &Artifact::Absent).unwrap();
    assert_eq!(cache.fetch(&key('b')).unwrap(), Artifact::Absent);
  }

  #[test]
  fn entry_without_marker_is_a_miss() {
    let temp = tempdir().unwrap();
    let cache = DirCache::new(temp.path());
    let entry = cache.entry_path(&key('c'));
    fs::create_dir_all(&entry).unwrap();
    fs::write(entry.join(ARTIFACT_NAME), "half written").unwrap();

    assert!(!cache.probe(&key('c')).unwrap());
    assert!(matches!(cache.fetch(&key('c')), Err(CacheError::Miss(_))));
  }

  #[test]
  fn tampered_entry_is_corrupt() {
    let temp = tempdir().unwrap();
    let cache = DirCache::new(temp.path());
    cache.store(&key('d'), &Artifact::File(b"original".to_vec())).unwrap();

    fs::write(cache.entry_path(&key('d')).join(ARTIFACT_NAME), "tampered").unwrap();

    assert!(cache.probe(&key('d')).unwrap());
    assert!(matches!(cache.fetch(&key('d')), Err(CacheError::Corrupt { .. })));
  }

  #[test]
  fn storing_twice_keeps_first_entry() {
    let temp = tempdir().unwrap();
    let cache = DirCache::new(temp.path());
    cache.store(&key('e'), &Artifact::File(b"first".to_vec())).unwrap();
    cache.store(&key('e'), &Artifact::File(b"second".to_vec())).unwrap();

    assert_eq!(cache.fetch(&key('e')).unwrap(), Artifact::File(b"first".to_vec()));
  }
}
