//! Memoizing target-to-rule resolution.
//!
//! [`RuleResolver`] owns every rule instance. Each target is constructed at most
//! once no matter how many threads ask for it concurrently: the first caller
//! claims a construction cell and builds, later callers block on the cell and
//! receive the same `Arc<Rule>` (or the same error).
//!
//! # Chains
//!
//! A top-level [`RuleResolver::resolve`] call opens a *chain*; every nested
//! resolution a factory performs through its [`RuleCtx`] runs on the same
//! chain. Re-entering a target the chain is already constructing is a cycle.
//! When a chain blocks on a cell owned by another chain it records the wait;
//! a wait that would close a loop across chains is reported as a cycle too,
//! instead of deadlocking.
//!
//! # Synthetic rules
//!
//! Factories may register extra rules (an `#abi` view, a dummy `R` class,
//! assembled resource directories) with [`RuleCtx::add_to_index`] before
//! returning their primary rule. Registering an equal rule twice is a no-op;
//! registering a different rule under a taken target fails. If the primary
//! construction fails, everything its frame registered is removed again.

mod cell;
mod ctx;
mod types;

pub use ctx::RuleCtx;
pub use types::*;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};

use crate::description::{Description, DescriptionRegistry};
use crate::graph::{TargetGraph, TargetNode};
use crate::rule::{Rule, RuleParams};
use crate::target::{BuildTarget, Flavor};

use cell::{ChainId, ChainTable, ConstructionCell};

enum Claim {
  Owner(Arc<ConstructionCell>),
  Existing(Arc<ConstructionCell>),
}

pub struct RuleResolver {
  graph: Arc<TargetGraph>,
  descriptions: Arc<DescriptionRegistry>,
  cells: DashMap<BuildTarget, Arc<ConstructionCell>>,
  chains: Mutex<ChainTable>,
  next_chain: AtomicU64,
  constructions: DashMap<BuildTarget, usize>,
  total_constructions: AtomicUsize,
}

impl RuleResolver {
  pub fn new(graph: Arc<TargetGraph>, descriptions: Arc<DescriptionRegistry>) -> Self {
    Self {
      graph,
      descriptions,
      cells: DashMap::new(),
      chains: Mutex::new(ChainTable::default()),
      next_chain: AtomicU64::new(1),
      constructions: DashMap::new(),
      total_constructions: AtomicUsize::new(0),
    }
  }

  pub fn graph(&self) -> &TargetGraph {
    &self.graph
  }

  pub fn descriptions(&self) -> &DescriptionRegistry {
    &self.descriptions
  }

  /// Rule for `target`, constructing it (and its dependencies) if needed.
  pub fn resolve(&self, target: &BuildTarget) -> Result<Arc<Rule>, ResolveError> {
    if let Some(rule) = self.get_rule_optional(target) {
      return Ok(rule);
    }
    let chain = self.open_chain();
    let result = self.resolve_in_chain(chain, target);
    self.lock_chains().close(chain);
    result
  }

  /// Resolve each target in order, stopping at the first failure.
  pub fn resolve_all<'a>(
    &self,
    targets: impl IntoIterator<Item = &'a BuildTarget>,
  ) -> Result<Vec<Arc<Rule>>, ResolveError> {
    targets.into_iter().map(|t| self.resolve(t)).collect()
  }

  /// Already constructed rule for `target`. Never constructs and never blocks.
  pub fn get_rule_optional(&self, target: &BuildTarget) -> Option<Arc<Rule>> {
    let cell = self.cells.get(target).map(|c| c.value().clone())?;
    cell.ready_rule()
  }

  /// Register a rule built outside any factory.
  pub fn add_to_index(&self, rule: Rule) -> Result<Arc<Rule>, ResolveError> {
    let chain = self.open_chain();
    let result = self.add_to_index_in_chain(chain, rule).map(|(rule, _)| rule);
    self.lock_chains().close(chain);
    result
  }

  /// Declared output location of a constructed rule.
  pub fn get_output_path(&self, target: &BuildTarget) -> Option<PathBuf> {
    self.get_rule_optional(target).and_then(|rule| rule.output.clone())
  }

  /// Every constructed rule, ordered by target.
  pub fn rules(&self) -> Vec<Arc<Rule>> {
    let cells: Vec<_> = self.cells.iter().map(|c| c.value().clone()).collect();
    let mut rules: Vec<_> = cells.iter().filter_map(|c| c.ready_rule()).collect();
    rules.sort_by(|a, b| a.target.cmp(&b.target));
    rules
  }

  /// How many times a factory ran for `target`.
  pub fn construction_count(&self, target: &BuildTarget) -> usize {
    self.constructions.get(target).map_or(0, |c| *c)
  }

  pub fn total_constructions(&self) -> usize {
    self.total_constructions.load(Ordering::Relaxed)
  }

  fn open_chain(&self) -> ChainId {
    let chain = self.next_chain.fetch_add(1, Ordering::Relaxed);
    self.lock_chains().open(chain);
    chain
  }

  fn lock_chains(&self) -> MutexGuard<'_, ChainTable> {
    self.chains.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn resolve_in_chain(&self, chain: ChainId, target: &BuildTarget) -> Result<Arc<Rule>, ResolveError> {
    if let Some(rule) = self.get_rule_optional(target) {
      return Ok(rule);
    }

    let node = self
      .graph
      .get(target)
      .ok_or_else(|| ResolveError::NoSuchTarget(target.clone()))?;
    let description = self
      .descriptions
      .get(node.kind())
      .ok_or_else(|| ResolveError::NoDescription {
        target: target.clone(),
        kind: node.kind(),
      })?;

    let synthetic: BTreeSet<Flavor> = target
      .flavors()
      .iter()
      .filter(|f| description.synthetic_flavors().contains(f))
      .cloned()
      .collect();
    if !synthetic.is_empty() {
      return self.resolve_synthetic(chain, target, &synthetic);
    }

    if !description.has_flavors(target.flavors()) {
      return Err(unrecognized_flavor(target, description.as_ref()));
    }

    match self.claim(chain, target) {
      Claim::Existing(cell) => self.await_cell(chain, target, &cell),
      Claim::Owner(cell) => self.construct(chain, target, node, description.as_ref(), &cell),
    }
  }

  /// Synthetic targets exist only once their parent's factory registers them.
  fn resolve_synthetic(
    &self,
    chain: ChainId,
    target: &BuildTarget,
    synthetic: &BTreeSet<Flavor>,
  ) -> Result<Arc<Rule>, ResolveError> {
    let parent = target.with_flavors(target.flavors().difference(synthetic).cloned());
    self.resolve_in_chain(chain, &parent)?;

    let cell = self.cells.get(target).map(|c| c.value().clone());
    match cell {
      Some(cell) => self.await_cell(chain, target, &cell),
      None => Err(ResolveError::UnrecognizedFlavor {
        target: target.clone(),
        flavor: synthetic.iter().next().cloned().unwrap_or_else(|| Flavor::from_static("")),
      }),
    }
  }

  fn claim(&self, chain: ChainId, target: &BuildTarget) -> Claim {
    let mut table = self.lock_chains();
    match self.cells.entry(target.clone()) {
      Entry::Occupied(entry) => Claim::Existing(entry.get().clone()),
      Entry::Vacant(entry) => {
        let cell = Arc::new(ConstructionCell::pending(chain));
        entry.insert(cell.clone());
        table.push(chain, target.clone());
        Claim::Owner(cell)
      }
    }
  }

  fn await_cell(
    &self,
    chain: ChainId,
    target: &BuildTarget,
    cell: &ConstructionCell,
  ) -> Result<Arc<Rule>, ResolveError> {
    {
      let mut table = self.lock_chains();
      if let Some(result) = cell.snapshot() {
        return result;
      }
      if cell.owner == chain {
        let path = table.cycle_in_chain(chain, target);
        warn!(rule = %target, "dependency cycle within one resolution");
        return Err(ResolveError::GraphCycle { path });
      }
      if let Some(path) = table.find_wait_cycle(chain, target, cell.owner) {
        warn!(rule = %target, "dependency cycle across concurrent resolutions");
        return Err(ResolveError::GraphCycle { path });
      }
      table.set_waiting(chain, Some((target.clone(), cell.owner)));
    }

    debug!(rule = %target, "waiting for concurrent construction");
    let result = cell.wait();
    self.lock_chains().set_waiting(chain, None);
    result
  }

  fn construct(
    &self,
    chain: ChainId,
    target: &BuildTarget,
    node: &TargetNode,
    description: &dyn Description,
    cell: &Arc<ConstructionCell>,
  ) -> Result<Arc<Rule>, ResolveError> {
    let ctx = RuleCtx::new(self, chain, target.clone());
    let result = self.run_factory(&ctx, node, description).and_then(|rule| {
      if rule.target == *target {
        Ok(rule)
      } else {
        Err(ResolveError::DuplicateRuleRegistration {
          target: rule.target.clone(),
          reason: format!("factory for {target} returned a rule for another target"),
        })
      }
    });

    if let Err(err) = &result {
      debug!(rule = %target, error = %err, "construction failed");
      for indexed in ctx.take_indexed() {
        self.cells.remove_if(&indexed, |_, c| c.owner == chain);
      }
    }

    cell.publish(&result);
    if result.is_err() {
      self.cells.remove_if(target, |_, c| Arc::ptr_eq(c, cell));
    }
    self.lock_chains().pop(chain, target);
    result
  }

  fn run_factory(
    &self,
    ctx: &RuleCtx<'_>,
    node: &TargetNode,
    description: &dyn Description,
  ) -> Result<Arc<Rule>, ResolveError> {
    for dep in node.deps() {
      ctx.resolve(&dep)?;
    }

    let params = RuleParams {
      target: ctx.target().clone(),
      declared_deps: node.declared_deps(),
      extra_deps: node.extra_deps(),
    };
    *self.constructions.entry(ctx.target().clone()).or_insert(0) += 1;
    self.total_constructions.fetch_add(1, Ordering::Relaxed);
    debug!(rule = %ctx.target(), kind = %node.kind(), "constructing rule");

    description.create_rule(ctx, params, &node.args)
  }

  /// Returns the registered rule and whether this call inserted it.
  fn add_to_index_in_chain(&self, chain: ChainId, rule: Rule) -> Result<(Arc<Rule>, bool), ResolveError> {
    let target = rule.target.clone();
    let rule = Arc::new(rule);

    let existing = match self.cells.entry(target.clone()) {
      Entry::Vacant(entry) => {
        entry.insert(Arc::new(ConstructionCell::ready(chain, rule.clone())));
        debug!(rule = %target, "registered rule");
        return Ok((rule, true));
      }
      Entry::Occupied(entry) => entry.get().clone(),
    };

    let current = match existing.snapshot() {
      Some(result) => result,
      None if existing.owner == chain => {
        return Err(ResolveError::DuplicateRuleRegistration {
          target,
          reason: "its construction is still in progress".to_string(),
        });
      }
      None => self.await_cell(chain, &target, &existing),
    }?;

    if *current == *rule {
      Ok((current, false))
    } else {
      Err(ResolveError::DuplicateRuleRegistration {
        target,
        reason: "a different rule is already registered".to_string(),
      })
    }
  }
}

fn unrecognized_flavor(target: &BuildTarget, description: &dyn Description) -> ResolveError {
  let offending = target
    .flavors()
    .iter()
    .find(|f| !description.has_flavors(&BTreeSet::from([(*f).clone()])))
    .or_else(|| target.flavors().iter().next())
    .cloned()
    .unwrap_or_else(|| Flavor::from_static(""));
  ResolveError::UnrecognizedFlavor {
    target: target.clone(),
    flavor: offending,
  }
}
