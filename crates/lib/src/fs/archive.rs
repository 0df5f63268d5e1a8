//! Deterministic zip archives: sorted entries, stored compression, fixed timestamps.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::rule::Step;

use super::StepError;

fn options() -> SimpleFileOptions {
  SimpleFileOptions::default()
    .compression_method(CompressionMethod::Stored)
    .last_modified_time(DateTime::default())
    .unix_permissions(0o644)
}

fn archive_err(step: &Step, path: &Path, message: impl ToString) -> StepError {
  StepError::Archive {
    step: step.description(),
    path: path.to_path_buf(),
    message: message.to_string(),
  }
}

/// Collect `(entry name, file)` pairs, expanding directories.
fn collect_entries(step: &Step, entries: &[(String, PathBuf)]) -> Result<BTreeMap<String, PathBuf>, StepError> {
  let mut files = BTreeMap::new();
  for (name, source) in entries {
    let prefix = name.trim_matches('/');
    if source.is_dir() {
      for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| archive_err(step, source, e))?;
        if !entry.file_type().is_file() {
          continue;
        }
        let rel = entry
          .path()
          .strip_prefix(source)
          .map_err(|e| archive_err(step, entry.path(), e))?
          .to_string_lossy()
          .replace('\\', "/");
        let entry_name = if prefix.is_empty() {
          rel
        } else {
          format!("{prefix}/{rel}")
        };
        files.entry(entry_name).or_insert_with(|| entry.path().to_path_buf());
      }
    } else if source.is_file() {
      let entry_name = if prefix.is_empty() {
        source
          .file_name()
          .map(|n| n.to_string_lossy().to_string())
          .unwrap_or_default()
      } else {
        prefix.to_string()
      };
      files.entry(entry_name).or_insert_with(|| source.clone());
    } else {
      return Err(archive_err(step, source, "no such file or directory"));
    }
  }
  Ok(files)
}

fn parent_dirs(names: impl IntoIterator<Item = String>) -> BTreeSet<String> {
  let mut dirs = BTreeSet::new();
  for name in names {
    let mut current = name.as_str();
    while let Some((parent, _)) = current.rsplit_once('/') {
      dirs.insert(format!("{parent}/"));
      current = parent;
    }
  }
  dirs
}

pub(super) fn write_zip(step: &Step, out: &Path, entries: &[(String, PathBuf)]) -> Result<(), StepError> {
  let files = collect_entries(step, entries)?;
  let mut contents = BTreeMap::new();
  for (name, path) in files {
    let bytes = fs::read(&path).map_err(|e| archive_err(step, &path, e))?;
    contents.insert(name, bytes);
  }
  write_archive(step, out, contents)
}

pub(super) fn merge_zips(step: &Step, out: &Path, inputs: &[PathBuf]) -> Result<(), StepError> {
  let mut contents = BTreeMap::new();
  for input in inputs {
    let file = fs::File::open(input).map_err(|e| archive_err(step, input, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| archive_err(step, input, e))?;
    for index in 0..archive.len() {
      let mut entry = archive.by_index(index).map_err(|e| archive_err(step, input, e))?;
      if entry.is_dir() || contents.contains_key(entry.name()) {
        continue;
      }
      let name = entry.name().to_string();
      let mut bytes = Vec::new();
      entry.read_to_end(&mut bytes).map_err(|e| archive_err(step, input, e))?;
      contents.insert(name, bytes);
    }
  }
  write_archive(step, out, contents)
}

fn write_archive(step: &Step, out: &Path, contents: BTreeMap<String, Vec<u8>>) -> Result<(), StepError> {
  if let Some(parent) = out.parent() {
    fs::create_dir_all(parent).map_err(|e| archive_err(step, parent, e))?;
  }
  let file = fs::File::create(out).map_err(|e| archive_err(step, out, e))?;
  let mut writer = ZipWriter::new(BufWriter::new(file));

  for dir in parent_dirs(contents.keys().cloned()) {
    writer
      .add_directory(dir, options())
      .map_err(|e| archive_err(step, out, e))?;
  }
  for (name, bytes) in contents {
    writer.start_file(name, options()).map_err(|e| archive_err(step, out, e))?;
    writer.write_all(&bytes).map_err(|e| archive_err(step, out, e))?;
  }

  let mut inner = writer.finish().map_err(|e| archive_err(step, out, e))?;
  inner.flush().map_err(|e| archive_err(step, out, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn names(path: &Path) -> Vec<String> {
    let mut archive = ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    (0..archive.len())
      .map(|i| archive.by_index(i).unwrap().name().to_string())
      .collect()
  }

  fn step() -> Step {
    Step::Zip {
      out: "test.zip".into(),
      entries: Vec::new(),
    }
  }

  #[test]
  fn directory_entries_are_prefixed_and_sorted() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("res/values")).unwrap();
    fs::write(temp.path().join("res/values/b.xml"), "b").unwrap();
    fs::write(temp.path().join("res/a.xml"), "a").unwrap();
    let out = temp.path().join("out.zip");

    write_zip(&step(), &out, &[("res".to_string(), temp.path().join("res"))]).unwrap();

    assert_eq!(names(&out), vec!["res/", "res/values/", "res/a.xml", "res/values/b.xml"]);
  }

  #[test]
  fn merge_keeps_first_entry() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("one.txt"), "first").unwrap();
    fs::write(temp.path().join("two.txt"), "second").unwrap();
    let first = temp.path().join("first.zip");
    let second = temp.path().join("second.zip");
    write_zip(&step(), &first, &[("same.txt".to_string(), temp.path().join("one.txt"))]).unwrap();
    write_zip(&step(), &second, &[("same.txt".to_string(), temp.path().join("two.txt"))]).unwrap();

    let merged = temp.path().join("merged.zip");
    merge_zips(&step(), &merged, &[first, second]).unwrap();

    let mut archive = ZipArchive::new(fs::File::open(&merged).unwrap()).unwrap();
    let mut text = String::new();
    archive.by_name("same.txt").unwrap().read_to_string(&mut text).unwrap();
    assert_eq!(text, "first");
  }

  #[test]
  fn missing_source_is_an_error() {
    let temp = TempDir::new().unwrap();
    let err = write_zip(
      &step(),
      &temp.path().join("out.zip"),
      &[("x".to_string(), temp.path().join("missing"))],
    )
    .unwrap_err();
    assert!(matches!(err, StepError::Archive { .. }));
  }
}
