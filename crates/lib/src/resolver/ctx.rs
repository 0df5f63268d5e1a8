use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::Arc;

use crate::rule::{Rule, SourcePath};
use crate::target::BuildTarget;

use super::cell::ChainId;
use super::{ResolveError, RuleResolver};

/// A factory's handle on the resolver while it constructs one target.
///
/// All nested resolution goes through the context so it stays on the caller's
/// chain, and every rule registered here is rolled back if the factory fails.
pub struct RuleCtx<'a> {
  resolver: &'a RuleResolver,
  chain: ChainId,
  target: BuildTarget,
  indexed: RefCell<Vec<BuildTarget>>,
}

impl<'a> RuleCtx<'a> {
  pub(super) fn new(resolver: &'a RuleResolver, chain: ChainId, target: BuildTarget) -> Self {
    Self {
      resolver,
      chain,
      target,
      indexed: RefCell::new(Vec::new()),
    }
  }

  /// The target under construction.
  pub fn target(&self) -> &BuildTarget {
    &self.target
  }

  pub fn resolve(&self, target: &BuildTarget) -> Result<Arc<Rule>, ResolveError> {
    self.resolver.resolve_in_chain(self.chain, target)
  }

  pub fn resolve_all<'b>(
    &self,
    targets: impl IntoIterator<Item = &'b BuildTarget>,
  ) -> Result<Vec<Arc<Rule>>, ResolveError> {
    targets.into_iter().map(|t| self.resolve(t)).collect()
  }

  pub fn get_rule_optional(&self, target: &BuildTarget) -> Option<Arc<Rule>> {
    self.resolver.get_rule_optional(target)
  }

  /// Register a rule this factory synthesized.
  pub fn add_to_index(&self, rule: Rule) -> Result<Arc<Rule>, ResolveError> {
    let (rule, inserted) = self.resolver.add_to_index_in_chain(self.chain, rule)?;
    if inserted {
      self.indexed.borrow_mut().push(rule.target.clone());
    }
    Ok(rule)
  }

  /// The unflavored rule a flavored view is derived from.
  ///
  /// Reuses the registered instance when there is one, otherwise constructs it
  /// through the normal single-flight path.
  pub fn base_rule(&self) -> Result<Arc<Rule>, ResolveError> {
    let base = self.target.unflavored();
    match self.get_rule_optional(&base) {
      Some(rule) => Ok(rule),
      None => self.resolve(&base),
    }
  }

  /// Register the rule for `target` unless one is already registered.
  ///
  /// When `target` is the target under construction the rule is returned
  /// unregistered; the resolver publishes it as this factory's result.
  pub fn index_synthetic(
    &self,
    target: &BuildTarget,
    build: impl FnOnce() -> Result<Rule, ResolveError>,
  ) -> Result<Arc<Rule>, ResolveError> {
    if *target == self.target {
      return build().map(Arc::new);
    }
    if let Some(existing) = self.get_rule_optional(target) {
      return Ok(existing);
    }
    self.add_to_index(build()?)
  }

  /// Filesystem path of a source: the path itself, or the producing rule's output.
  pub fn source_path(&self, source: &SourcePath) -> Result<PathBuf, ResolveError> {
    match source {
      SourcePath::Path(path) => Ok(path.clone()),
      SourcePath::Target(producer) => {
        let rule = self.resolve(producer)?;
        rule.output.clone().ok_or_else(|| ResolveError::InvalidArgument {
          target: self.target.clone(),
          message: format!("{producer} is used as a source but has no output"),
        })
      }
    }
  }

  pub fn source_paths<'b>(
    &self,
    sources: impl IntoIterator<Item = &'b SourcePath>,
  ) -> Result<Vec<PathBuf>, ResolveError> {
    sources.into_iter().map(|s| self.source_path(s)).collect()
  }

  pub(super) fn take_indexed(&self) -> Vec<BuildTarget> {
    std::mem::take(&mut *self.indexed.borrow_mut())
  }
}
