//! Construction bookkeeping: one cell per target, and the table of active
//! resolution chains used to detect cycles.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::rule::Rule;
use crate::target::BuildTarget;

use super::ResolveError;

/// Identifies one top-level resolution and every nested resolution it performs.
pub(super) type ChainId = u64;

pub(super) enum CellState {
  Pending,
  Ready(Arc<Rule>),
  Failed(ResolveError),
}

/// Single-flight slot for one target. The owning chain builds; everyone else waits.
pub(super) struct ConstructionCell {
  pub(super) owner: ChainId,
  state: Mutex<CellState>,
  ready: Condvar,
}

impl ConstructionCell {
  pub(super) fn pending(owner: ChainId) -> Self {
    Self {
      owner,
      state: Mutex::new(CellState::Pending),
      ready: Condvar::new(),
    }
  }

  pub(super) fn ready(owner: ChainId, rule: Arc<Rule>) -> Self {
    Self {
      owner,
      state: Mutex::new(CellState::Ready(rule)),
      ready: Condvar::new(),
    }
  }

  fn lock(&self) -> MutexGuard<'_, CellState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Final result, or `None` while construction is in progress.
  pub(super) fn snapshot(&self) -> Option<Result<Arc<Rule>, ResolveError>> {
    match &*self.lock() {
      CellState::Pending => None,
      CellState::Ready(rule) => Some(Ok(rule.clone())),
      CellState::Failed(err) => Some(Err(err.clone())),
    }
  }

  pub(super) fn ready_rule(&self) -> Option<Arc<Rule>> {
    match &*self.lock() {
      CellState::Ready(rule) => Some(rule.clone()),
      _ => None,
    }
  }

  pub(super) fn publish(&self, result: &Result<Arc<Rule>, ResolveError>) {
    {
      let mut state = self.lock();
      *state = match result {
        Ok(rule) => CellState::Ready(rule.clone()),
        Err(err) => CellState::Failed(err.clone()),
      };
    }
    self.ready.notify_all();
  }

  /// Block until the owner publishes.
  pub(super) fn wait(&self) -> Result<Arc<Rule>, ResolveError> {
    let mut state = self.lock();
    loop {
      match &*state {
        CellState::Pending => {
          state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        CellState::Ready(rule) => return Ok(rule.clone()),
        CellState::Failed(err) => return Err(err.clone()),
      }
    }
  }
}

#[derive(Default)]
struct Chain {
  /// Targets this chain is constructing, outermost first.
  stack: Vec<BuildTarget>,
  /// Target (and its owning chain) this chain is blocked on.
  waiting_on: Option<(BuildTarget, ChainId)>,
}

#[derive(Default)]
pub(super) struct ChainTable {
  chains: HashMap<ChainId, Chain>,
}

impl ChainTable {
  pub(super) fn open(&mut self, chain: ChainId) {
    self.chains.insert(chain, Chain::default());
  }

  pub(super) fn close(&mut self, chain: ChainId) {
    self.chains.remove(&chain);
  }

  pub(super) fn push(&mut self, chain: ChainId, target: BuildTarget) {
    self.chains.entry(chain).or_default().stack.push(target);
  }

  pub(super) fn pop(&mut self, chain: ChainId, target: &BuildTarget) {
    if let Some(entry) = self.chains.get_mut(&chain)
      && let Some(pos) = entry.stack.iter().rposition(|t| t == target)
    {
      entry.stack.truncate(pos);
    }
  }

  pub(super) fn set_waiting(&mut self, chain: ChainId, waiting_on: Option<(BuildTarget, ChainId)>) {
    if let Some(entry) = self.chains.get_mut(&chain) {
      entry.waiting_on = waiting_on;
    }
  }

  /// `chain` re-entered `target` while still constructing it.
  pub(super) fn cycle_in_chain(&self, chain: ChainId, target: &BuildTarget) -> Vec<BuildTarget> {
    let mut path = self.stack_from(chain, target);
    path.push(target.clone());
    path
  }

  /// Would `chain` waiting on `target` (owned by `owner`) close a wait-for loop?
  /// Returns the dependency path of the loop if so.
  pub(super) fn find_wait_cycle(
    &self,
    chain: ChainId,
    target: &BuildTarget,
    owner: ChainId,
  ) -> Option<Vec<BuildTarget>> {
    let mut segments = vec![(owner, target.clone())];
    let mut visited = HashSet::new();
    let mut current = owner;

    loop {
      if !visited.insert(current) {
        return None;
      }
      let (next_target, next_owner) = self.chains.get(&current)?.waiting_on.clone()?;
      if next_owner == chain {
        let mut path = self.stack_from(chain, &next_target);
        for (segment_chain, segment_target) in &segments {
          path.extend(self.stack_from(*segment_chain, segment_target));
        }
        path.push(next_target);
        return Some(path);
      }
      segments.push((next_owner, next_target));
      current = next_owner;
    }
  }

  fn stack_from(&self, chain: ChainId, target: &BuildTarget) -> Vec<BuildTarget> {
    let stack = self.chains.get(&chain).map(|c| c.stack.as_slice()).unwrap_or_default();
    match stack.iter().position(|t| t == target) {
      Some(pos) => stack[pos..].to_vec(),
      None => vec![target.clone()],
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn target(raw: &str) -> BuildTarget {
    BuildTarget::parse(raw).unwrap()
  }

  #[test]
  fn in_chain_cycle_path_starts_at_reentered_target() {
    let mut table = ChainTable::default();
    table.open(1);
    table.push(1, target("//root:root"));
    table.push(1, target("//a:a"));
    table.push(1, target("//b:b"));

    assert_eq!(
      table.cycle_in_chain(1, &target("//a:a")),
      vec![target("//a:a"), target("//b:b"), target("//a:a")]
    );
  }

  #[test]
  fn cross_chain_wait_loop_is_detected() {
    let mut table = ChainTable::default();
    table.open(1);
    table.open(2);
    // Chain 1 builds A and wants B; chain 2 builds B and already waits on A.
    table.push(1, target("//a:a"));
    table.push(2, target("//b:b"));
    table.set_waiting(2, Some((target("//a:a"), 1)));

    let path = table.find_wait_cycle(1, &target("//b:b"), 2).unwrap();
    assert_eq!(path, vec![target("//a:a"), target("//b:b"), target("//a:a")]);
  }

  #[test]
  fn plain_wait_is_not_a_cycle() {
    let mut table = ChainTable::default();
    table.open(1);
    table.open(2);
    table.push(2, target("//b:b"));

    assert!(table.find_wait_cycle(1, &target("//b:b"), 2).is_none());
  }

  #[test]
  fn pop_discards_the_finished_frame() {
    let mut table = ChainTable::default();
    table.open(1);
    table.push(1, target("//a:a"));
    table.push(1, target("//b:b"));
    table.pop(1, &target("//b:b"));

    assert_eq!(table.cycle_in_chain(1, &target("//a:a")), vec![target("//a:a"), target("//a:a")]);
  }
}
