//! Action graph for build scheduling.
//!
//! Nodes are constructed rules, edges run from a dependency to its dependents.
//! Waves group rules whose dependencies all sit in earlier waves, so every
//! rule in a wave can build in parallel.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::resolver::RuleResolver;
use crate::rule::Rule;
use crate::target::BuildTarget;

use super::types::ExecuteError;

pub struct ActionGraph {
  graph: DiGraph<Arc<Rule>, ()>,
  nodes: HashMap<BuildTarget, NodeIndex>,
}

impl ActionGraph {
  /// Every rule reachable from `roots` through declared and extra deps.
  pub fn from_roots(resolver: &RuleResolver, roots: &[Arc<Rule>]) -> Result<Self, ExecuteError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();
    let mut queue: VecDeque<Arc<Rule>> = VecDeque::new();

    for rule in roots {
      if !nodes.contains_key(&rule.target) {
        nodes.insert(rule.target.clone(), graph.add_node(rule.clone()));
        queue.push_back(rule.clone());
      }
    }

    while let Some(rule) = queue.pop_front() {
      let dependent = nodes[&rule.target];
      for dep in rule.deps() {
        let dep_idx = match nodes.get(dep) {
          Some(&idx) => idx,
          None => {
            let dep_rule = resolver.resolve(dep).map_err(|source| ExecuteError::MissingDependency {
              rule: rule.target.clone(),
              dep: dep.clone(),
              source,
            })?;
            let idx = graph.add_node(dep_rule.clone());
            nodes.insert(dep.clone(), idx);
            queue.push_back(dep_rule);
            idx
          }
        };
        graph.add_edge(dep_idx, dependent, ());
      }
    }

    let dag = Self { graph, nodes };
    dag.verify_acyclic()?;
    Ok(dag)
  }

  fn verify_acyclic(&self) -> Result<(), ExecuteError> {
    toposort(&self.graph, None).map_err(|_| ExecuteError::CycleDetected)?;
    Ok(())
  }

  /// Rules grouped into parallel waves, each wave ordered by target.
  pub fn waves(&self) -> Result<Vec<Vec<BuildTarget>>, ExecuteError> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = remaining.iter().filter(|idx| in_degree[*idx] == 0).copied().collect();
      if ready.is_empty() {
        return Err(ExecuteError::CycleDetected);
      }

      let mut wave = Vec::with_capacity(ready.len());
      for idx in ready {
        remaining.remove(&idx);
        for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(degree) = in_degree.get_mut(&dependent) {
            *degree = degree.saturating_sub(1);
          }
        }
        wave.push(self.graph[idx].target.clone());
      }
      wave.sort();
      waves.push(wave);
    }

    Ok(waves)
  }

  /// Direct dependencies of `target`, ordered.
  pub fn dependencies(&self, target: &BuildTarget) -> BTreeSet<BuildTarget> {
    let Some(&idx) = self.nodes.get(target) else {
      return BTreeSet::new();
    };
    self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep| self.graph[dep].target.clone())
      .collect()
  }

  pub fn rule(&self, target: &BuildTarget) -> Option<&Arc<Rule>> {
    self.nodes.get(target).map(|&idx| &self.graph[idx])
  }

  pub fn targets(&self) -> impl Iterator<Item = &BuildTarget> {
    self.nodes.keys()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}
