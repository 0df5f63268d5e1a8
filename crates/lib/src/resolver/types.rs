use thiserror::Error;

use crate::graph::TargetKind;
use crate::target::{BuildTarget, Flavor};

/// Why a target could not be turned into a rule.
///
/// `Clone` because every thread waiting on a failed construction receives the
/// same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
  #[error("no target graph node for {0}")]
  NoSuchTarget(BuildTarget),

  #[error("no description registered for {kind} (needed by {target})")]
  NoDescription { target: BuildTarget, kind: TargetKind },

  #[error("unrecognized flavor in target {target} while constructing rule: {flavor}")]
  UnrecognizedFlavor { target: BuildTarget, flavor: Flavor },

  #[error("dependency cycle: {}", format_cycle(.path))]
  GraphCycle { path: Vec<BuildTarget> },

  #[error("cannot register {target}: {reason}")]
  DuplicateRuleRegistration { target: BuildTarget, reason: String },

  #[error("{target}: expected {expected} arguments, got {actual}")]
  ArgsMismatch {
    target: BuildTarget,
    expected: TargetKind,
    actual: TargetKind,
  },

  #[error("{target}: {message}")]
  InvalidArgument { target: BuildTarget, message: String },
}

fn format_cycle(path: &[BuildTarget]) -> String {
  path.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> ")
}
