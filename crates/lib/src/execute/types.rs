//! Outcomes, reports and configuration of a build.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::KilnConfig;
use crate::fs::StepError;
use crate::resolver::ResolveError;
use crate::rulekey::{KeyError, RuleKey};
use crate::target::BuildTarget;

/// Where a rule is in its build.
///
/// `Pending → KeyComputed → {Fetched | Building → Built} | Failed`, or
/// `Skipped` when a dependency failed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
  Pending,
  KeyComputed,
  Building,
  Built,
  Fetched,
  Failed,
  Skipped,
}

/// Why one rule failed on its own account.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  InputUnavailable(#[from] KeyError),

  #[error("step '{step}' failed: {source}")]
  StepExecutionFailure {
    step: String,
    #[source]
    source: StepError,
  },

  #[error("cache hit could not be restored: {0}")]
  CacheFetch(#[source] CacheError),

  #[error("cannot hash output {path}: {message}")]
  OutputUnreadable { path: PathBuf, message: String },

  #[error("build cancelled")]
  Cancelled,

  #[error("build task aborted: {0}")]
  Aborted(String),
}

/// Final result for one requested target.
#[derive(Debug, Clone)]
pub enum BuildOutcome {
  Built { output: Option<PathBuf> },
  Fetched { output: Option<PathBuf> },
  Failed(BuildError),
  Skipped { root_cause: BuildTarget },
}

impl BuildOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, BuildOutcome::Built { .. } | BuildOutcome::Fetched { .. })
  }

  pub fn output(&self) -> Option<&PathBuf> {
    match self {
      BuildOutcome::Built { output } | BuildOutcome::Fetched { output } => output.as_ref(),
      _ => None,
    }
  }
}

/// Everything one build did.
#[derive(Debug, Default)]
pub struct BuildReport {
  /// One entry per requested target.
  pub outcomes: BTreeMap<BuildTarget, BuildOutcome>,
  /// Final state of every rule in the action graph.
  pub states: BTreeMap<BuildTarget, RuleState>,
  /// Every state each rule passed through, in order.
  pub transitions: BTreeMap<BuildTarget, Vec<RuleState>>,
  pub keys: BTreeMap<BuildTarget, RuleKey>,
  /// Rules that failed themselves, not because of a dependency.
  pub failures: BTreeMap<BuildTarget, BuildError>,
  /// Skipped rule to the dependency whose failure skipped it.
  pub skipped: BTreeMap<BuildTarget, BuildTarget>,
  pub outputs: BTreeMap<BuildTarget, Option<PathBuf>>,
  pub rules_built: usize,
  pub rules_fetched: usize,
  pub keys_computed: usize,
}

impl BuildReport {
  pub fn is_success(&self) -> bool {
    self.failures.is_empty() && self.skipped.is_empty()
  }

  pub fn outcome(&self, target: &BuildTarget) -> Option<&BuildOutcome> {
    self.outcomes.get(target)
  }

  pub fn state(&self, target: &BuildTarget) -> Option<RuleState> {
    self.states.get(target).copied()
  }

  pub fn transitions(&self, target: &BuildTarget) -> &[RuleState] {
    self.transitions.get(target).map_or(&[], Vec::as_slice)
  }

  /// Move `target` to `state`.
  pub fn record(&mut self, target: &BuildTarget, state: RuleState) {
    self.states.insert(target.clone(), state);
    self.transitions.entry(target.clone()).or_default().push(state);
  }

  /// Every rule that failed independently.
  pub fn failed_roots(&self) -> Vec<&BuildTarget> {
    self.failures.keys().collect()
  }

  /// `target` followed by each dependency it was skipped for, ending at the
  /// rule that actually failed. Empty when `target` neither failed nor was skipped.
  pub fn failure_chain(&self, target: &BuildTarget) -> Vec<BuildTarget> {
    let mut chain = Vec::new();
    let mut current = target.clone();
    loop {
      if self.failures.contains_key(&current) {
        chain.push(current);
        return chain;
      }
      match self.skipped.get(&current) {
        Some(dep) if !chain.contains(&current) => {
          chain.push(current);
          current = dep.clone();
        }
        _ => return Vec::new(),
      }
    }
  }

  /// Output path of a built or fetched rule.
  pub fn output_path(&self, target: &BuildTarget) -> Option<&PathBuf> {
    self.outputs.get(target).and_then(Option::as_ref)
  }
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of rules building at once.
  pub parallelism: usize,
  /// Project root that rule paths are relative to.
  pub root: PathBuf,
}

impl ExecuteConfig {
  pub fn from_config(config: &KilnConfig) -> Self {
    Self {
      parallelism: config.build.parallelism.max(1),
      root: config.root(),
    }
  }
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: std::thread::available_parallelism().map_or(4, |p| p.get()),
      root: PathBuf::from("."),
    }
  }
}

/// Failures that stop a build before any rule runs.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error("dependency cycle detected in the action graph")]
  CycleDetected,

  #[error("{rule} depends on {dep}, which cannot be resolved: {source}")]
  MissingDependency {
    rule: BuildTarget,
    dep: BuildTarget,
    #[source]
    source: ResolveError,
  },
}

#[cfg(test)]
mod tests {
  use super::*;

  fn target(raw: &str) -> BuildTarget {
    BuildTarget::parse(raw).unwrap()
  }

  #[test]
  fn empty_report_is_success() {
    let report = BuildReport::default();
    assert!(report.is_success());
    assert!(report.failed_roots().is_empty());
  }

  #[test]
  fn failure_chain_ends_at_root_cause() {
    let mut report = BuildReport::default();
    report.failures.insert(target("//lib:a"), BuildError::Cancelled);
    report.skipped.insert(target("//lib:b"), target("//lib:a"));
    report.skipped.insert(target("//app:c"), target("//lib:b"));

    assert_eq!(
      report.failure_chain(&target("//app:c")),
      vec![target("//app:c"), target("//lib:b"), target("//lib:a")]
    );
    assert_eq!(report.failure_chain(&target("//lib:a")), vec![target("//lib:a")]);
    assert!(report.failure_chain(&target("//other:d")).is_empty());
    assert_eq!(report.failed_roots(), vec![&target("//lib:a")]);
    assert!(!report.is_success());
  }

  #[test]
  fn outcome_output_only_for_successes() {
    let built = BuildOutcome::Built {
      output: Some(PathBuf::from("kiln-out/gen/app/app.js")),
    };
    assert!(built.is_success());
    assert_eq!(built.output(), Some(&PathBuf::from("kiln-out/gen/app/app.js")));

    let skipped = BuildOutcome::Skipped {
      root_cause: target("//lib:a"),
    };
    assert!(!skipped.is_success());
    assert!(skipped.output().is_none());
  }

  #[test]
  fn execute_config_clamps_parallelism() {
    let mut config = KilnConfig::default();
    config.build.parallelism = 0;
    config.build.root = Some(PathBuf::from("/work"));

    let execute = ExecuteConfig::from_config(&config);
    assert_eq!(execute.parallelism, 1);
    assert_eq!(execute.root, PathBuf::from("/work"));
  }
}
