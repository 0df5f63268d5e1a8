//! SHA-256 content hashes shared by rule keys, the engine and the cache.
//!
//! A directory hashes as a tree: one `F:<name>:<file hash>` line per regular
//! file, in `/`-separated path order. Empty directories and symlink names do
//! not count, so a directory built in place and the same directory restored
//! from the cache always hash alike.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl fmt::Display for ContentHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

fn finish(hasher: Sha256) -> ContentHash {
  ContentHash(format!("{:x}", hasher.finalize()))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  finish(Sha256::new_with_prefix(data))
}

/// Hash a file's contents without loading it whole.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
  let mut hasher = Sha256::new();
  io::copy(&mut File::open(path)?, &mut hasher)?;
  Ok(finish(hasher))
}

/// Hash of a tree given each file's relative name and content hash, in
/// name order.
pub fn tree_hash<'a>(files: impl IntoIterator<Item = (&'a str, ContentHash)>) -> ContentHash {
  let mut hasher = Sha256::new();
  for (name, hash) in files {
    hasher.update(format!("F:{name}:{hash}\n").as_bytes());
  }
  finish(hasher)
}

/// Hash the regular files under `root`, following symlinks.
pub fn hash_tree(root: &Path) -> io::Result<ContentHash> {
  let mut files = BTreeMap::new();
  for entry in WalkDir::new(root).follow_links(true) {
    let entry = entry?;
    if !entry.file_type().is_file() {
      continue;
    }
    let name = entry
      .path()
      .strip_prefix(root)
      .map_err(io::Error::other)?
      .to_string_lossy()
      .replace('\\', "/");
    files.insert(name, hash_file(entry.path())?);
  }
  Ok(tree_hash(files.iter().map(|(name, hash)| (name.as_str(), hash.clone()))))
}

/// Hash whatever exists at `path`: a tree for directories, content otherwise.
pub fn hash_path(path: &Path) -> io::Result<ContentHash> {
  if fs::metadata(path)?.is_dir() {
    hash_tree(path)
  } else {
    hash_file(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn file_hash_streams_the_same_digest_as_bytes() {
    let temp = tempdir().unwrap();
    let jar = temp.path().join("app.jar");
    fs::write(&jar, vec![7u8; 20_000]).unwrap();

    assert_eq!(hash_file(&jar).unwrap(), hash_bytes(&[7u8; 20_000]));
    assert_eq!(hash_bytes(b"").0.len(), 64);
  }

  #[test]
  fn empty_directories_do_not_count() {
    let temp = tempdir().unwrap();
    let out = temp.path().join("res");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("strings.xml"), "<resources/>").unwrap();
    let before = hash_tree(&out).unwrap();

    fs::create_dir_all(out.join("drawable")).unwrap();
    assert_eq!(before, hash_tree(&out).unwrap());
  }

  #[test]
  fn moving_a_file_changes_the_tree_hash() {
    let temp = tempdir().unwrap();
    let flat = temp.path().join("flat");
    let nested = temp.path().join("nested");
    fs::create_dir_all(&flat).unwrap();
    fs::create_dir_all(nested.join("values")).unwrap();
    fs::write(flat.join("strings.xml"), "x").unwrap();
    fs::write(nested.join("values/strings.xml"), "x").unwrap();

    assert_ne!(hash_tree(&flat).unwrap(), hash_tree(&nested).unwrap());
  }

  #[test]
  fn tree_entries_are_ordered_by_full_name() {
    let temp = tempdir().unwrap();
    let out = temp.path().join("out");
    fs::create_dir_all(out.join("a")).unwrap();
    fs::write(out.join("a/b.txt"), "inner").unwrap();
    fs::write(out.join("a.txt"), "outer").unwrap();

    // "a.txt" sorts before "a/b.txt" even though the walk visits "a/" first.
    let expected = tree_hash([("a.txt", hash_bytes(b"outer")), ("a/b.txt", hash_bytes(b"inner"))]);
    assert_eq!(hash_tree(&out).unwrap(), expected);
  }

  #[test]
  fn hash_path_picks_file_or_tree() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("lib.js");
    fs::write(&file, "lib();").unwrap();

    assert_eq!(hash_path(&file).unwrap(), hash_bytes(b"lib();"));
    assert_eq!(hash_path(temp.path()).unwrap(), hash_tree(temp.path()).unwrap());
    let missing = hash_path(&temp.path().join("gone")).unwrap_err();
    assert_eq!(missing.kind(), io::ErrorKind::NotFound);
  }
}
