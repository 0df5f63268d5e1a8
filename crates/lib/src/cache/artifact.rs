use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

use crate::util::hash::{ContentHash, hash_bytes, tree_hash};

use super::CacheError;

/// The output of one rule, detached from where it lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
  /// The rule declared an output but produced nothing there.
  Absent,
  File(Vec<u8>),
  /// Files keyed by `/`-separated path relative to the output directory.
  Dir(BTreeMap<String, Vec<u8>>),
}

impl Artifact {
  /// Read whatever exists at `path`. Symlinks are followed.
  pub fn capture(path: &Path) -> Result<Self, CacheError> {
    let meta = match fs::metadata(path) {
      Ok(meta) => meta,
      Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Artifact::Absent),
      Err(err) => return Err(CacheError::io(path, err)),
    };

    if !meta.is_dir() {
      return fs::read(path).map(Artifact::File).map_err(|e| CacheError::io(path, e));
    }

    let mut files = BTreeMap::new();
    for entry in WalkDir::new(path).follow_links(true).sort_by_file_name() {
      let entry = entry.map_err(|e| CacheError::io(path, e))?;
      if !entry.file_type().is_file() {
        continue;
      }
      let relative = entry
        .path()
        .strip_prefix(path)
        .map_err(|e| CacheError::io(entry.path(), e))?
        .to_string_lossy()
        .replace('\\', "/");
      let bytes = fs::read(entry.path()).map_err(|e| CacheError::io(entry.path(), e))?;
      files.insert(relative, bytes);
    }
    Ok(Artifact::Dir(files))
  }

  /// Write the artifact to `path`, replacing whatever was there.
  pub fn materialize(&self, path: &Path) -> Result<(), CacheError> {
    remove_existing(path)?;
    match self {
      Artifact::Absent => Ok(()),
      Artifact::File(bytes) => {
        create_parent(path)?;
        fs::write(path, bytes).map_err(|e| CacheError::io(path, e))
      }
      Artifact::Dir(files) => {
        fs::create_dir_all(path).map_err(|e| CacheError::io(path, e))?;
        for (name, bytes) in files {
          let file = path.join(name);
          create_parent(&file)?;
          fs::write(&file, bytes).map_err(|e| CacheError::io(&file, e))?;
        }
        Ok(())
      }
    }
  }

  /// Hash over the artifact's kind, file names and contents.
  pub fn content_hash(&self) -> ContentHash {
    match self {
      Artifact::Absent => hash_bytes(b"<absent>"),
      Artifact::File(bytes) => hash_bytes(bytes),
      Artifact::Dir(files) => tree_hash(files.iter().map(|(name, bytes)| (name.as_str(), hash_bytes(bytes)))),
    }
  }

  pub fn size(&self) -> usize {
    match self {
      Artifact::Absent => 0,
      Artifact::File(bytes) => bytes.len(),
      Artifact::Dir(files) => files.values().map(Vec::len).sum(),
    }
  }
}

fn remove_existing(path: &Path) -> Result<(), CacheError> {
  let result = match fs::symlink_metadata(path) {
    Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
    Ok(_) => fs::remove_file(path),
    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(err) => Err(err),
  };
  result.map_err(|e| CacheError::io(path, e))
}

fn create_parent(path: &Path) -> Result<(), CacheError> {
  match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => {
      fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))
    }
    _ => Ok(()),
  }
}
