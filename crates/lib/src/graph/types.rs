use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::description::{DescriptionRegistry, MavenCoordinates};
use crate::target::BuildTarget;

use super::{TargetArgs, TargetKind};

#[derive(Debug, Error)]
pub enum GraphError {
  #[error("target graph nodes must be unflavored: {0}")]
  FlavoredNode(BuildTarget),

  #[error("duplicate target graph node: {0}")]
  DuplicateNode(BuildTarget),

  #[error("{target} depends on {dep}, which is not in the target graph")]
  MissingDependency { target: BuildTarget, dep: BuildTarget },

  #[error("{target} is missing required argument '{field}'")]
  MissingArgument { target: BuildTarget, field: &'static str },

  #[error("{target}: {message}")]
  InvalidArgument { target: BuildTarget, message: String },

  #[error("failed to parse target graph: {0}")]
  Json(#[from] serde_json::Error),
}

/// A declared target: identity, kind-specific arguments and dependency edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetNode {
  pub target: BuildTarget,
  #[serde(flatten)]
  pub args: TargetArgs,
  /// Dependencies a description infers from the arguments.
  #[serde(skip)]
  pub implicit_deps: BTreeSet<BuildTarget>,
}

impl TargetNode {
  pub fn new(target: BuildTarget, args: TargetArgs) -> Self {
    Self {
      target,
      args,
      implicit_deps: BTreeSet::new(),
    }
  }

  pub fn kind(&self) -> TargetKind {
    self.args.kind()
  }

  /// Dependencies named in the arguments.
  pub fn declared_deps(&self) -> BTreeSet<BuildTarget> {
    self.args.declared_deps()
  }

  /// Implicit dependencies plus rules whose outputs are used as sources.
  pub fn extra_deps(&self) -> BTreeSet<BuildTarget> {
    let mut deps = self.implicit_deps.clone();
    deps.extend(self.args.source_paths().into_iter().filter_map(|s| s.as_target()).cloned());
    deps
  }

  /// Every target that must be resolved before this node's rule is created.
  pub fn deps(&self) -> BTreeSet<BuildTarget> {
    let mut deps = self.declared_deps();
    deps.extend(self.extra_deps());
    deps
  }
}

/// Immutable mapping from unflavored target to node.
#[derive(Debug, Clone, Default)]
pub struct TargetGraph {
  nodes: BTreeMap<BuildTarget, TargetNode>,
}

impl TargetGraph {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_nodes(nodes: impl IntoIterator<Item = TargetNode>) -> Result<Self, GraphError> {
    let mut graph = Self::new();
    for node in nodes {
      graph.add(node)?;
    }
    Ok(graph)
  }

  /// Parse a JSON array of nodes:
  /// `[{"target": "//app:lib", "type": "java_library", "srcs": ["Lib.java"]}]`.
  pub fn from_json(raw: &str) -> Result<Self, GraphError> {
    let nodes: Vec<TargetNode> = serde_json::from_str(raw)?;
    debug!(nodes = nodes.len(), "parsed target graph");
    Self::from_nodes(nodes)
  }

  pub fn add(&mut self, node: TargetNode) -> Result<(), GraphError> {
    if node.target.is_flavored() {
      return Err(GraphError::FlavoredNode(node.target));
    }
    if self.nodes.contains_key(&node.target) {
      return Err(GraphError::DuplicateNode(node.target));
    }
    self.nodes.insert(node.target.clone(), node);
    Ok(())
  }

  /// Node for `target`, ignoring any flavors on the lookup key.
  pub fn get(&self, target: &BuildTarget) -> Option<&TargetNode> {
    if target.is_flavored() {
      self.nodes.get(&target.unflavored())
    } else {
      self.nodes.get(target)
    }
  }

  pub fn nodes(&self) -> impl Iterator<Item = &TargetNode> {
    self.nodes.values()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Ask each node's description for implicit dependencies and record them on the node.
  pub fn add_implicit_deps(&mut self, registry: &DescriptionRegistry) {
    for node in self.nodes.values_mut() {
      if let Some(description) = registry.get(node.kind()) {
        node.implicit_deps = description.find_implicit_deps(&node.target, &node.args);
      }
    }
  }

  /// Check that every edge points at a node and required arguments are present.
  pub fn validate(&self) -> Result<(), GraphError> {
    for node in self.nodes.values() {
      for dep in node.deps() {
        if self.get(&dep).is_none() {
          return Err(GraphError::MissingDependency {
            target: node.target.clone(),
            dep,
          });
        }
      }
      validate_args(node)?;
    }
    Ok(())
  }
}

fn validate_args(node: &TargetNode) -> Result<(), GraphError> {
  let missing = |field| GraphError::MissingArgument {
    target: node.target.clone(),
    field,
  };
  let check_coords = |coords: Option<&String>| match coords {
    Some(raw) => MavenCoordinates::parse(raw)
      .map(|_| ())
      .map_err(|message| GraphError::InvalidArgument {
        target: node.target.clone(),
        message,
      }),
    None => Ok(()),
  };

  match &node.args {
    TargetArgs::JavaLibrary(args) => check_coords(args.maven_coords.as_ref()),
    TargetArgs::AndroidLibrary(args) => check_coords(args.java.maven_coords.as_ref()),
    TargetArgs::AndroidAar(args) if args.manifest_skeleton.is_none() => Err(missing("manifest_skeleton")),
    TargetArgs::Genrule(args) if args.cmd.is_none() => Err(missing("cmd")),
    TargetArgs::Genrule(args) if args.out.is_none() => Err(missing("out")),
    _ => Ok(()),
  }
}
