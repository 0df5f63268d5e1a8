//! Incremental build engine.
//!
//! [`BuildEngine::build`] resolves the requested targets, assembles the action
//! graph and builds it wave by wave. For each rule it:
//! - skips the rule if any dependency failed, remembering the root cause
//! - computes the rule key once every dependency is built or fetched
//! - restores the output from the artifact cache on a hit
//! - otherwise runs the rule's steps in order and stores the result
//!
//! Non-cacheable rules never touch the cache. Cache errors other than a failed
//! restore of a declared hit only produce a warning.

pub mod dag;
pub mod types;

pub use dag::ActionGraph;
pub use types::{BuildError, BuildOutcome, BuildReport, ExecuteConfig, ExecuteError, RuleState};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{self, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::cache::{Artifact, ArtifactCache, DirCache, NoopCache};
use crate::config::KilnConfig;
use crate::fs::{CancelFlag, ContentReader, LocalFilesystem, StepContext, StepError, StepExecutor};
use crate::resolver::{ResolveError, RuleResolver};
use crate::rule::Rule;
use crate::rulekey::{DepState, RuleKey, RuleKeyEngine};
use crate::target::BuildTarget;
use crate::util::hash::{ContentHash, hash_bytes};

pub struct BuildEngine {
  config: ExecuteConfig,
  reader: Arc<dyn ContentReader>,
  executor: Arc<dyn StepExecutor>,
  cache: Arc<dyn ArtifactCache>,
  cancel: CancelFlag,
}

/// How a rule that did not fail finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finish {
  Built,
  Fetched,
}

#[derive(Debug)]
struct RuleResult {
  target: BuildTarget,
  key: Option<RuleKey>,
  /// States passed through before the final one.
  trace: Vec<RuleState>,
  result: Result<(Finish, DepState), BuildError>,
}

impl RuleResult {
  fn aborted(target: BuildTarget, reason: String) -> Self {
    Self {
      target,
      key: None,
      trace: Vec::new(),
      result: Err(BuildError::Aborted(reason)),
    }
  }
}

/// Turn a build task that died into a failure of the rule it was building.
fn abandoned(err: JoinError, tasks: &HashMap<task::Id, BuildTarget>) -> Option<RuleResult> {
  let target = tasks.get(&err.id())?.clone();
  error!(rule = %target, error = %err, "build task panicked");
  Some(RuleResult::aborted(target, err.to_string()))
}

impl BuildEngine {
  pub fn new(
    config: ExecuteConfig,
    reader: Arc<dyn ContentReader>,
    executor: Arc<dyn StepExecutor>,
    cache: Arc<dyn ArtifactCache>,
  ) -> Self {
    Self {
      config,
      reader,
      executor,
      cache,
      cancel: CancelFlag::new(),
    }
  }

  /// Engine over the local filesystem, caching under the configured cache
  /// directory unless caching is disabled.
  pub fn local(config: &KilnConfig) -> Self {
    let execute = ExecuteConfig::from_config(config);
    let fs = Arc::new(LocalFilesystem::new(execute.root.clone()));
    let cache: Arc<dyn ArtifactCache> = if config.build.cache_enabled {
      Arc::new(DirCache::new(config.cache_dir()))
    } else {
      Arc::new(NoopCache)
    };
    Self::new(execute, fs.clone(), fs, cache)
  }

  /// Flag that aborts the build at the next step boundary once set.
  pub fn cancel_flag(&self) -> CancelFlag {
    self.cancel.clone()
  }

  pub async fn build(
    &self,
    resolver: &Arc<RuleResolver>,
    targets: &[BuildTarget],
  ) -> Result<BuildReport, ExecuteError> {
    info!(targets = targets.len(), "starting build");
    let mut report = BuildReport::default();

    let mut roots = Vec::new();
    for (target, resolved) in resolve_concurrently(resolver, targets).await {
      match resolved {
        Ok(rule) => roots.push(rule),
        Err(err) => {
          error!(rule = %target, error = %err, "resolution failed");
          let err = BuildError::Resolve(err);
          report.failures.insert(target.clone(), err.clone());
          report.outcomes.insert(target, BuildOutcome::Failed(err));
        }
      }
    }

    let graph = ActionGraph::from_roots(resolver, &roots)?;
    let waves = graph.waves()?;
    info!(rules = graph.len(), waves = waves.len(), "computed build waves");
    for target in graph.targets() {
      report.record(target, RuleState::Pending);
    }

    let keys = Arc::new(RuleKeyEngine::new(self.reader.clone()));
    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
    let mut completed: HashMap<BuildTarget, DepState> = HashMap::new();
    // Failed or skipped rule to the rule whose own failure caused it.
    let mut root_causes: HashMap<BuildTarget, BuildTarget> = HashMap::new();

    for (index, wave) in waves.iter().enumerate() {
      debug!(wave = index, rules = wave.len(), "executing wave");
      let snapshot = Arc::new(completed.clone());
      let mut join_set = JoinSet::new();
      let mut tasks: HashMap<task::Id, BuildTarget> = HashMap::new();

      for target in wave {
        let failed_dep = graph
          .dependencies(target)
          .into_iter()
          .find(|dep| root_causes.contains_key(dep));
        if let Some(dep) = failed_dep {
          let root_cause = root_causes[&dep].clone();
          warn!(rule = %target, dep = %dep, root_cause = %root_cause, "skipping rule after dependency failure");
          report.record(target, RuleState::Skipped);
          report.skipped.insert(target.clone(), dep);
          root_causes.insert(target.clone(), root_cause);
          continue;
        }

        let Some(rule) = graph.rule(target).cloned() else {
          continue;
        };
        let task = RuleTask {
          rule,
          deps: snapshot.clone(),
          keys: keys.clone(),
          reader: self.reader.clone(),
          executor: self.executor.clone(),
          cache: self.cache.clone(),
          cancel: self.cancel.clone(),
          root: self.config.root.clone(),
        };
        let semaphore = semaphore.clone();
        let handle = join_set.spawn(async move {
          let target = task.rule.target.clone();
          let _permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(err) => return RuleResult::aborted(target, err.to_string()),
          };
          task::spawn_blocking(move || task.run())
            .await
            .unwrap_or_else(|err| RuleResult::aborted(target, err.to_string()))
        });
        tasks.insert(handle.id(), target.clone());
      }

      while let Some(joined) = join_set.join_next().await {
        let outcome = match joined {
          Ok(outcome) => outcome,
          Err(err) => match abandoned(err, &tasks) {
            Some(outcome) => outcome,
            None => continue,
          },
        };
        if let Some(key) = outcome.key {
          report.keys.insert(outcome.target.clone(), key);
        }
        for state in outcome.trace {
          report.record(&outcome.target, state);
        }
        match outcome.result {
          Ok((finish, state)) => {
            let output = graph.rule(&outcome.target).and_then(|r| r.output.clone());
            match finish {
              Finish::Built => {
                report.rules_built += 1;
                report.record(&outcome.target, RuleState::Built);
              }
              Finish::Fetched => {
                report.rules_fetched += 1;
                report.record(&outcome.target, RuleState::Fetched);
              }
            }
            report.outputs.insert(outcome.target.clone(), output);
            completed.insert(outcome.target, state);
          }
          Err(err) => {
            error!(rule = %outcome.target, error = %err, "rule failed");
            report.record(&outcome.target, RuleState::Failed);
            report.failures.insert(outcome.target.clone(), err);
            root_causes.insert(outcome.target.clone(), outcome.target);
          }
        }
      }
    }

    for rule in &roots {
      let target = &rule.target;
      let outcome = match report.state(target) {
        Some(RuleState::Built) => BuildOutcome::Built {
          output: rule.output.clone(),
        },
        Some(RuleState::Fetched) => BuildOutcome::Fetched {
          output: rule.output.clone(),
        },
        Some(RuleState::Skipped) => BuildOutcome::Skipped {
          root_cause: root_causes.get(target).cloned().unwrap_or_else(|| target.clone()),
        },
        _ => BuildOutcome::Failed(
          report
            .failures
            .get(target)
            .cloned()
            .unwrap_or_else(|| BuildError::Aborted("rule never finished".to_string())),
        ),
      };
      report.outcomes.insert(target.clone(), outcome);
    }

    report.keys_computed = keys.computations();
    info!(
      built = report.rules_built,
      fetched = report.rules_fetched,
      failed = report.failures.len(),
      skipped = report.skipped.len(),
      "build complete"
    );
    Ok(report)
  }
}

/// Resolve every requested target on the blocking pool, in parallel.
async fn resolve_concurrently(
  resolver: &Arc<RuleResolver>,
  targets: &[BuildTarget],
) -> Vec<(BuildTarget, Result<Arc<Rule>, ResolveError>)> {
  let mut join_set = JoinSet::new();
  for target in targets {
    let resolver = resolver.clone();
    let target = target.clone();
    join_set.spawn_blocking(move || {
      let result = resolver.resolve(&target);
      (target, result)
    });
  }

  let mut resolved = Vec::with_capacity(targets.len());
  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok(entry) => resolved.push(entry),
      Err(err) => error!(error = %err, "resolution task panicked"),
    }
  }
  resolved.sort_by(|a, b| a.0.cmp(&b.0));
  resolved
}

/// Everything one rule's build needs, owned so it can move to the blocking pool.
struct RuleTask {
  rule: Arc<Rule>,
  deps: Arc<HashMap<BuildTarget, DepState>>,
  keys: Arc<RuleKeyEngine>,
  reader: Arc<dyn ContentReader>,
  executor: Arc<dyn StepExecutor>,
  cache: Arc<dyn ArtifactCache>,
  cancel: CancelFlag,
  root: PathBuf,
}

impl RuleTask {
  fn run(self) -> RuleResult {
    let target = self.rule.target.clone();
    let key = match self.keys.compute_key(&self.rule, &self.deps) {
      Ok(key) => key,
      Err(err) => {
        return RuleResult {
          target,
          key: None,
          trace: Vec::new(),
          result: Err(BuildError::InputUnavailable(err)),
        };
      }
    };
    debug!(rule = %target, key = %key, "rule key computed");

    let mut trace = vec![RuleState::KeyComputed];
    let result = self.build_with_key(&key, &mut trace);
    RuleResult {
      target,
      key: Some(key),
      trace,
      result,
    }
  }

  fn build_with_key(
    &self,
    key: &RuleKey,
    trace: &mut Vec<RuleState>,
  ) -> Result<(Finish, DepState), BuildError> {
    let rule = &self.rule;
    if self.cancel.is_cancelled() {
      return Err(BuildError::Cancelled);
    }

    let finish = if rule.cacheable && self.fetch(key)? {
      Finish::Fetched
    } else {
      trace.push(RuleState::Building);
      self.run_steps()?;
      Finish::Built
    };

    let output_hash = self.output_hash()?;
    if finish == Finish::Built && rule.cacheable {
      self.store(key);
    }

    Ok((
      finish,
      DepState {
        key: key.clone(),
        output: rule.output.clone(),
        output_hash,
      },
    ))
  }

  /// Restore the output on a cache hit. Probe errors count as a miss.
  fn fetch(&self, key: &RuleKey) -> Result<bool, BuildError> {
    match self.cache.probe(key) {
      Ok(true) => {}
      Ok(false) => return Ok(false),
      Err(err) => {
        warn!(rule = %self.rule.target, key = %key, error = %err, "cache probe failed, building");
        return Ok(false);
      }
    }

    let artifact = self.cache.fetch(key).map_err(BuildError::CacheFetch)?;
    if let Some(output) = &self.rule.output {
      artifact
        .materialize(&self.root.join(output))
        .map_err(BuildError::CacheFetch)?;
    }
    debug!(rule = %self.rule.target, key = %key, "cache hit");
    Ok(true)
  }

  fn run_steps(&self) -> Result<(), BuildError> {
    let ctx = StepContext {
      target: &self.rule.target,
      cancel: &self.cancel,
    };
    for step in &self.rule.steps {
      if self.cancel.is_cancelled() {
        return Err(BuildError::Cancelled);
      }
      debug!(rule = %self.rule.target, step = step.short_name(), "running step");
      self.executor.execute(step, &ctx).map_err(|source| match source {
        StepError::Cancelled => BuildError::Cancelled,
        source => BuildError::StepExecutionFailure {
          step: step.description(),
          source,
        },
      })?;
    }
    if self.cancel.is_cancelled() {
      return Err(BuildError::Cancelled);
    }
    Ok(())
  }

  /// Hash of what the rule left at its output path.
  fn output_hash(&self) -> Result<ContentHash, BuildError> {
    let Some(output) = &self.rule.output else {
      return Ok(hash_bytes(b"<no-output>"));
    };
    match self.reader.content_hash(output) {
      Ok(hash) => Ok(hash),
      Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(hash_bytes(b"<absent>")),
      Err(err) => Err(BuildError::OutputUnreadable {
        path: output.clone(),
        message: err.to_string(),
      }),
    }
  }

  fn store(&self, key: &RuleKey) {
    let artifact = match &self.rule.output {
      Some(output) => Artifact::capture(&self.root.join(output)),
      None => Ok(Artifact::Absent),
    };
    let stored = artifact.and_then(|artifact| self.cache.store(key, &artifact));
    if let Err(err) = stored {
      warn!(rule = %self.rule.target, key = %key, error = %err, "cache store failed");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn explode() -> RuleResult {
    panic!("step blew up")
  }

  #[tokio::test]
  async fn panicked_task_fails_the_rule_it_was_building() {
    let target = BuildTarget::parse("//app:lib").unwrap();
    let mut join_set = JoinSet::new();
    let handle = join_set.spawn(async { explode() });
    let tasks = HashMap::from([(handle.id(), target.clone())]);

    let err = join_set.join_next().await.unwrap().unwrap_err();
    let outcome = abandoned(err, &tasks).unwrap();

    assert_eq!(outcome.target, target);
    assert!(outcome.key.is_none());
    assert!(matches!(outcome.result, Err(BuildError::Aborted(_))));
  }

  #[tokio::test]
  async fn unknown_task_is_ignored() {
    let mut join_set = JoinSet::new();
    join_set.spawn(async { explode() });

    let err = join_set.join_next().await.unwrap().unwrap_err();
    assert!(abandoned(err, &HashMap::new()).is_none());
  }
}
