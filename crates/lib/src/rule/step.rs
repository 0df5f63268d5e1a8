use std::collections::BTreeMap;
use std::path::PathBuf;

/// One unit of work in a rule's build.
///
/// Paths are relative to the project root unless absolute. Steps are plain data;
/// a step executor decides how to carry them out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
  /// Remove `path` if present, then create it as an empty directory.
  MakeCleanDir { path: PathBuf },
  Mkdir { path: PathBuf },
  Copy { from: PathBuf, to: PathBuf },
  /// Recursively copy the contents of `from` into `to`.
  CopyDir { from: PathBuf, to: PathBuf },
  Symlink { target: PathBuf, link: PathBuf },
  WriteFile { path: PathBuf, contents: String },
  /// Concatenate `srcs` in order into `out`.
  Concat { srcs: Vec<PathBuf>, out: PathBuf },
  /// Write a deterministic zip archive. A directory source is expanded under
  /// its entry name; an empty entry name places its contents at the root.
  Zip { out: PathBuf, entries: Vec<ZipEntry> },
  /// Merge zip archives into one. The first archive providing an entry wins.
  MergeZips { out: PathBuf, inputs: Vec<PathBuf> },
  Cmd(CmdStep),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZipEntry {
  pub name: String,
  pub source: PathBuf,
}

impl ZipEntry {
  pub fn new(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
    Self {
      name: name.into(),
      source: source.into(),
    }
  }
}

/// An external command. The environment is isolated: only `env` and `PATH` are set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CmdStep {
  pub program: String,
  pub args: Vec<String>,
  pub env: BTreeMap<String, String>,
  pub cwd: Option<PathBuf>,
}

impl CmdStep {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      env: BTreeMap::new(),
      cwd: None,
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }
}

impl Step {
  pub fn short_name(&self) -> &'static str {
    match self {
      Step::MakeCleanDir { .. } => "make_clean_dir",
      Step::Mkdir { .. } => "mkdir",
      Step::Copy { .. } => "copy",
      Step::CopyDir { .. } => "copy_dir",
      Step::Symlink { .. } => "symlink",
      Step::WriteFile { .. } => "write_file",
      Step::Concat { .. } => "concat",
      Step::Zip { .. } => "zip",
      Step::MergeZips { .. } => "merge_zips",
      Step::Cmd(_) => "cmd",
    }
  }

  /// Human readable one-liner for logs and failure reports.
  pub fn description(&self) -> String {
    match self {
      Step::MakeCleanDir { path } => format!("rm -rf {0} && mkdir -p {0}", path.display()),
      Step::Mkdir { path } => format!("mkdir -p {}", path.display()),
      Step::Copy { from, to } => format!("cp {} {}", from.display(), to.display()),
      Step::CopyDir { from, to } => format!("cp -R {}/. {}", from.display(), to.display()),
      Step::Symlink { target, link } => format!("ln -s {} {}", target.display(), link.display()),
      Step::WriteFile { path, .. } => format!("write {}", path.display()),
      Step::Concat { srcs, out } => format!("cat {} srcs > {}", srcs.len(), out.display()),
      Step::Zip { out, entries } => format!("zip {} ({} entries)", out.display(), entries.len()),
      Step::MergeZips { out, inputs } => format!("merge {} archives into {}", inputs.len(), out.display()),
      Step::Cmd(cmd) => {
        let mut line = cmd.program.clone();
        for arg in &cmd.args {
          line.push(' ');
          line.push_str(arg);
        }
        line
      }
    }
  }
}
