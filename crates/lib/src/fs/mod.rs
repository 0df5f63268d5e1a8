//! Filesystem and step execution collaborators.
//!
//! The rule key engine only needs to read file contents ([`ContentReader`]);
//! the build engine only needs to run steps ([`StepExecutor`]). Both are
//! traits so tests and embedders can substitute in-memory or remote versions.
//! [`LocalFilesystem`] implements both against a project root on disk.

mod archive;
mod local;

pub use local::LocalFilesystem;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::rule::Step;
use crate::target::BuildTarget;
use crate::util::hash::{ContentHash, hash_bytes};

/// Read access to rule inputs.
pub trait ContentReader: Send + Sync {
  fn read_content(&self, path: &Path) -> io::Result<Vec<u8>>;

  /// Content hash of the input at `path`. Readers that understand directories
  /// override this to hash whole trees.
  fn content_hash(&self, path: &Path) -> io::Result<ContentHash> {
    Ok(hash_bytes(&self.read_content(path)?))
  }
}

/// Runs one step on behalf of a rule.
pub trait StepExecutor: Send + Sync {
  fn execute(&self, step: &Step, ctx: &StepContext<'_>) -> Result<(), StepError>;
}

pub struct StepContext<'a> {
  pub target: &'a BuildTarget,
  pub cancel: &'a CancelFlag,
}

/// Shared cancellation signal. Once set, no new step starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

#[derive(Debug, Clone, Error)]
pub enum StepError {
  #[error("{step}: {message}")]
  Io { step: String, message: String },

  #[error("command failed with exit code {code:?}: {cmd}")]
  CmdFailed { cmd: String, code: Option<i32>, stderr: String },

  #[error("{step}: cannot archive {path}: {message}")]
  Archive { step: String, path: PathBuf, message: String },

  #[error("cancelled")]
  Cancelled,
}

impl StepError {
  fn io(step: &Step, err: io::Error) -> Self {
    StepError::Io {
      step: step.description(),
      message: err.to_string(),
    }
  }
}
