use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::rule::{CmdStep, Step};
use crate::util::hash::{ContentHash, hash_path};

use super::{ContentReader, StepContext, StepError, StepExecutor, archive};

/// Reads inputs and runs steps relative to a project root on local disk.
#[derive(Debug, Clone)]
pub struct LocalFilesystem {
  root: PathBuf,
  path_env: String,
}

impl LocalFilesystem {
  /// Commands inherit the current `PATH` so configured tools can be found;
  /// every other variable is cleared.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      path_env: std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()),
    }
  }

  pub fn with_path_env(mut self, path_env: impl Into<String>) -> Self {
    self.path_env = path_env.into();
    self
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Absolute form of a project-relative path.
  pub fn resolve(&self, path: &Path) -> PathBuf {
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.root.join(path)
    }
  }

  fn run(&self, step: &Step, ctx: &StepContext<'_>) -> Result<(), StepError> {
    let io_err = |e: io::Error| StepError::io(step, e);

    match step {
      Step::MakeCleanDir { path } => {
        let path = self.resolve(path);
        match fs::remove_dir_all(&path) {
          Ok(()) => {}
          Err(e) if e.kind() == io::ErrorKind::NotFound => {}
          Err(e) => return Err(io_err(e)),
        }
        fs::create_dir_all(&path).map_err(io_err)
      }
      Step::Mkdir { path } => fs::create_dir_all(self.resolve(path)).map_err(io_err),
      Step::Copy { from, to } => {
        let to = self.resolve(to);
        create_parent(&to).map_err(io_err)?;
        fs::copy(self.resolve(from), &to).map(|_| ()).map_err(io_err)
      }
      Step::CopyDir { from, to } => copy_dir(&self.resolve(from), &self.resolve(to)).map_err(io_err),
      Step::Symlink { target, link } => {
        let link = self.resolve(link);
        create_parent(&link).map_err(io_err)?;
        if fs::symlink_metadata(&link).is_ok() {
          fs::remove_file(&link).map_err(io_err)?;
        }
        symlink(&self.resolve(target), &link).map_err(io_err)
      }
      Step::WriteFile { path, contents } => {
        let path = self.resolve(path);
        create_parent(&path).map_err(io_err)?;
        fs::write(&path, contents).map_err(io_err)
      }
      Step::Concat { srcs, out } => {
        let out = self.resolve(out);
        create_parent(&out).map_err(io_err)?;
        let mut file = fs::File::create(&out).map_err(io_err)?;
        for src in srcs {
          let bytes = fs::read(self.resolve(src)).map_err(io_err)?;
          file.write_all(&bytes).map_err(io_err)?;
        }
        file.flush().map_err(io_err)
      }
      Step::Zip { out, entries } => {
        let entries: Vec<_> = entries
          .iter()
          .map(|entry| (entry.name.clone(), self.resolve(&entry.source)))
          .collect();
        archive::write_zip(step, &self.resolve(out), &entries)
      }
      Step::MergeZips { out, inputs } => {
        let inputs: Vec<_> = inputs.iter().map(|p| self.resolve(p)).collect();
        archive::merge_zips(step, &self.resolve(out), &inputs)
      }
      Step::Cmd(cmd) => self.run_cmd(cmd, ctx),
    }
  }

  fn run_cmd(&self, cmd: &CmdStep, ctx: &StepContext<'_>) -> Result<(), StepError> {
    let line = Step::Cmd(cmd.clone()).description();
    let working_dir = cmd.cwd.as_deref().map_or_else(|| self.root.clone(), |cwd| self.resolve(cwd));
    let tmp_dir = self.root.join(crate::consts::OUT_DIR).join("tmp");
    fs::create_dir_all(&tmp_dir).map_err(|e| StepError::Io {
      step: line.clone(),
      message: e.to_string(),
    })?;

    let mut command = Command::new(&cmd.program);
    command
      .args(&cmd.args)
      .current_dir(&working_dir)
      .env_clear()
      .env("PATH", &self.path_env)
      .env("HOME", "/homeless-shelter")
      .env("TMPDIR", &tmp_dir)
      .env("LANG", "C")
      .env("LC_ALL", "C")
      .env("SOURCE_DATE_EPOCH", "315532800");
    for (key, value) in &cmd.env {
      command.env(key, value);
    }

    debug!(rule = %ctx.target, cmd = %line, working_dir = ?working_dir, "spawning process");
    let output = command.output().map_err(|e| StepError::Io {
      step: line.clone(),
      message: e.to_string(),
    })?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).to_string();
      if !stderr.is_empty() {
        debug!(stderr = %stderr, "command stderr");
      }
      return Err(StepError::CmdFailed {
        cmd: line,
        code: output.status.code(),
        stderr,
      });
    }
    Ok(())
  }
}

impl ContentReader for LocalFilesystem {
  fn read_content(&self, path: &Path) -> io::Result<Vec<u8>> {
    fs::read(self.resolve(path))
  }

  fn content_hash(&self, path: &Path) -> io::Result<ContentHash> {
    hash_path(&self.resolve(path))
  }
}

impl StepExecutor for LocalFilesystem {
  fn execute(&self, step: &Step, ctx: &StepContext<'_>) -> Result<(), StepError> {
    if ctx.cancel.is_cancelled() {
      return Err(StepError::Cancelled);
    }
    trace!(rule = %ctx.target, step = step.short_name(), "executing step");
    self.run(step, ctx)
  }
}

fn create_parent(path: &Path) -> io::Result<()> {
  match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
    _ => Ok(()),
  }
}

fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
  fs::create_dir_all(to)?;
  for entry in WalkDir::new(from).sort_by_file_name() {
    let entry = entry.map_err(io::Error::other)?;
    let rel = entry.path().strip_prefix(from).map_err(io::Error::other)?;
    if rel.as_os_str().is_empty() {
      continue;
    }
    let dest = to.join(rel);
    let file_type = entry.file_type();
    if file_type.is_dir() {
      fs::create_dir_all(&dest)?;
    } else if file_type.is_symlink() {
      let link_target = fs::read_link(entry.path())?;
      if fs::symlink_metadata(&dest).is_ok() {
        fs::remove_file(&dest)?;
      }
      symlink(&link_target, &dest)?;
    } else {
      fs::copy(entry.path(), &dest)?;
    }
  }
  Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
  if target.is_dir() {
    std::os::windows::fs::symlink_dir(target, link)
  } else {
    std::os::windows::fs::symlink_file(target, link)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fs::CancelFlag;
  use crate::rule::ZipEntry;
  use crate::target::BuildTarget;
  use tempfile::TempDir;

  fn run(fs: &LocalFilesystem, step: Step) -> Result<(), StepError> {
    let target = BuildTarget::parse("//test:rule").unwrap();
    let cancel = CancelFlag::new();
    fs.execute(
      &step,
      &StepContext {
        target: &target,
        cancel: &cancel,
      },
    )
  }

  #[test]
  fn make_clean_dir_removes_stale_contents() {
    let temp = TempDir::new().unwrap();
    let fs_root = LocalFilesystem::new(temp.path());
    fs::create_dir_all(temp.path().join("out")).unwrap();
    fs::write(temp.path().join("out/stale.txt"), "old").unwrap();

    run(&fs_root, Step::MakeCleanDir { path: "out".into() }).unwrap();

    assert!(temp.path().join("out").is_dir());
    assert!(!temp.path().join("out/stale.txt").exists());
  }

  #[test]
  fn concat_preserves_order() {
    let temp = TempDir::new().unwrap();
    let fs_root = LocalFilesystem::new(temp.path());
    fs::write(temp.path().join("a.js"), "a;").unwrap();
    fs::write(temp.path().join("b.js"), "b;").unwrap();

    run(
      &fs_root,
      Step::Concat {
        srcs: vec!["b.js".into(), "a.js".into()],
        out: "out/all.js".into(),
      },
    )
    .unwrap();

    assert_eq!(fs::read_to_string(temp.path().join("out/all.js")).unwrap(), "b;a;");
  }

  #[test]
  fn copy_dir_copies_nested_files() {
    let temp = TempDir::new().unwrap();
    let fs_root = LocalFilesystem::new(temp.path());
    fs::create_dir_all(temp.path().join("res/values")).unwrap();
    fs::write(temp.path().join("res/values/strings.xml"), "<resources/>").unwrap();

    run(
      &fs_root,
      Step::CopyDir {
        from: "res".into(),
        to: "out/res".into(),
      },
    )
    .unwrap();

    assert!(temp.path().join("out/res/values/strings.xml").is_file());
  }

  #[test]
  fn zip_output_is_deterministic() {
    let temp = TempDir::new().unwrap();
    let fs_root = LocalFilesystem::new(temp.path());
    fs::create_dir_all(temp.path().join("classes/com")).unwrap();
    fs::write(temp.path().join("classes/com/A.class"), "A").unwrap();

    let zip = |out: &str| Step::Zip {
      out: out.into(),
      entries: vec![ZipEntry::new("", "classes")],
    };
    run(&fs_root, zip("one.jar")).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(10));
    run(&fs_root, zip("two.jar")).unwrap();

    assert_eq!(
      fs::read(temp.path().join("one.jar")).unwrap(),
      fs::read(temp.path().join("two.jar")).unwrap()
    );
  }

  #[cfg(unix)]
  #[test]
  fn cmd_runs_with_isolated_env() {
    let temp = TempDir::new().unwrap();
    let fs_root = LocalFilesystem::new(temp.path());

    let step = Step::Cmd(
      CmdStep::new("/bin/sh")
        .args(["-c", "echo \"$GREETING:$HOME\" > out.txt"])
        .env("GREETING", "hi"),
    );
    run(&fs_root, step).unwrap();

    assert_eq!(
      fs::read_to_string(temp.path().join("out.txt")).unwrap().trim(),
      "hi:/homeless-shelter"
    );
  }

  #[cfg(unix)]
  #[test]
  fn failing_cmd_reports_exit_code() {
    let temp = TempDir::new().unwrap();
    let fs_root = LocalFilesystem::new(temp.path());

    let err = run(&fs_root, Step::Cmd(CmdStep::new("/bin/sh").args(["-c", "exit 3"]))).unwrap_err();
    assert!(matches!(err, StepError::CmdFailed { code: Some(3), .. }));
  }

  #[test]
  fn cancelled_context_refuses_to_start() {
    let temp = TempDir::new().unwrap();
    let fs_root = LocalFilesystem::new(temp.path());
    let target = BuildTarget::parse("//test:rule").unwrap();
    let cancel = CancelFlag::new();
    cancel.cancel();

    let err = fs_root
      .execute(
        &Step::Mkdir { path: "out".into() },
        &StepContext {
          target: &target,
          cancel: &cancel,
        },
      )
      .unwrap_err();

    assert!(matches!(err, StepError::Cancelled));
    assert!(!temp.path().join("out").exists());
  }

  #[test]
  fn content_hash_handles_directories() {
    let temp = TempDir::new().unwrap();
    let fs_root = LocalFilesystem::new(temp.path());
    fs::create_dir_all(temp.path().join("res")).unwrap();
    fs::write(temp.path().join("res/a.xml"), "a").unwrap();

    let before = fs_root.content_hash(Path::new("res")).unwrap();
    fs::write(temp.path().join("res/a.xml"), "b").unwrap();
    assert_ne!(before, fs_root.content_hash(Path::new("res")).unwrap());
  }

  #[test]
  fn content_hash_of_missing_path_is_not_found() {
    let temp = TempDir::new().unwrap();
    let fs_root = LocalFilesystem::new(temp.path());

    let err = fs_root.content_hash(Path::new("missing.jar")).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
  }
}
