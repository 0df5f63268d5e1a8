//! Rule factories, one per target kind.
//!
//! A [`Description`] turns a target node (plus the flavors requested on the
//! target) into a rule. The resolver validates flavors with
//! [`Description::has_flavors`] before calling [`Description::create_rule`],
//! and resolves every declared dependency first, so factories can look
//! dependencies up without worrying about order.

mod android_aar;
mod android_library;
mod android_resource;
mod genrule;
mod java_library;
mod js_library;
mod jvm;
mod maven;

pub use android_aar::AndroidAarDescription;
pub use android_library::AndroidLibraryDescription;
pub use android_resource::AndroidResourceDescription;
pub use genrule::GenruleDescription;
pub use java_library::JavaLibraryDescription;
pub use js_library::JsLibraryDescription;
pub use jvm::{RuleGatherer, library_jar_path};
pub use maven::MavenCoordinates;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::config::ToolsConfig;
use crate::graph::{TargetArgs, TargetKind};
use crate::resolver::{ResolveError, RuleCtx};
use crate::rule::{Rule, RuleParams};
use crate::target::{BuildTarget, Flavor};

pub trait Description: Send + Sync {
  fn kind(&self) -> TargetKind;

  /// Whether this kind can build the given flavor combination. Synthetic
  /// flavors are handled separately and never reach this check.
  fn has_flavors(&self, flavors: &BTreeSet<Flavor>) -> bool {
    flavors.is_empty()
  }

  /// Flavors naming rules this kind's enhancer registers as a side effect of
  /// constructing the parent target.
  fn synthetic_flavors(&self) -> &[Flavor] {
    &[]
  }

  /// Dependencies implied by the arguments rather than spelled out in them.
  fn find_implicit_deps(&self, _target: &BuildTarget, _args: &TargetArgs) -> BTreeSet<BuildTarget> {
    BTreeSet::new()
  }

  fn create_rule(
    &self,
    ctx: &RuleCtx<'_>,
    params: RuleParams,
    args: &TargetArgs,
  ) -> Result<Arc<Rule>, ResolveError>;
}

/// Maps each target kind to its description.
#[derive(Default)]
pub struct DescriptionRegistry {
  by_kind: BTreeMap<TargetKind, Arc<dyn Description>>,
}

impl DescriptionRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every built-in kind, configured with `tools`.
  pub fn with_defaults(tools: &ToolsConfig) -> Self {
    let mut registry = Self::new();
    registry.register(JavaLibraryDescription::new(tools.clone()));
    registry.register(AndroidLibraryDescription::new(tools.clone()));
    registry.register(AndroidResourceDescription);
    registry.register(AndroidAarDescription::new(tools.clone()));
    registry.register(JsLibraryDescription);
    registry.register(GenruleDescription::new(tools.clone()));
    registry
  }

  /// Register `description`, replacing any previous one for the same kind.
  pub fn register(&mut self, description: impl Description + 'static) {
    self.by_kind.insert(description.kind(), Arc::new(description));
  }

  pub fn get(&self, kind: TargetKind) -> Option<Arc<dyn Description>> {
    self.by_kind.get(&kind).cloned()
  }
}

fn args_mismatch(ctx: &RuleCtx<'_>, expected: TargetKind, args: &TargetArgs) -> ResolveError {
  ResolveError::ArgsMismatch {
    target: ctx.target().clone(),
    expected,
    actual: args.kind(),
  }
}

fn unrecognized_flavor(target: &BuildTarget) -> ResolveError {
  ResolveError::UnrecognizedFlavor {
    target: target.clone(),
    flavor: target
      .flavors()
      .iter()
      .next()
      .cloned()
      .unwrap_or_else(|| Flavor::from_static("")),
  }
}
