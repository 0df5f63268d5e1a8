use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::rulekey::KeyValue;
use crate::target::BuildTarget;

use super::{SourcePath, Step};

/// Dependency edges and identity a description starts from when building a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleParams {
  pub target: BuildTarget,
  /// Dependencies named by the target node, after resolution.
  pub declared_deps: BTreeSet<BuildTarget>,
  /// Dependencies a description adds on its own.
  pub extra_deps: BTreeSet<BuildTarget>,
}

impl RuleParams {
  pub fn new(target: BuildTarget, declared_deps: BTreeSet<BuildTarget>) -> Self {
    Self {
      target,
      declared_deps,
      extra_deps: BTreeSet::new(),
    }
  }

  pub fn copy_with_target(&self, target: BuildTarget) -> Self {
    Self {
      target,
      ..self.clone()
    }
  }

  pub fn copy_with_deps(&self, declared_deps: BTreeSet<BuildTarget>, extra_deps: BTreeSet<BuildTarget>) -> Self {
    Self {
      target: self.target.clone(),
      declared_deps,
      extra_deps,
    }
  }

  /// Same target and declared deps, extra deps extended with `deps`.
  pub fn append_extra_deps(&self, deps: impl IntoIterator<Item = BuildTarget>) -> Self {
    let mut params = self.clone();
    params.extra_deps.extend(deps);
    params
  }
}

/// What a JVM-producing rule exposes to its dependents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JvmInfo {
  pub srcs: BTreeSet<SourcePath>,
  pub exported_deps: BTreeSet<BuildTarget>,
  /// `group:artifact[:extension[:classifier]]:version` as declared.
  pub maven_coords: Option<String>,
  /// The synthetic `#abi` rule dependents compile against.
  pub abi_target: Option<BuildTarget>,
}

/// What an Android resource rule exposes to its dependents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AndroidResourceInfo {
  pub res: Option<SourcePath>,
  pub assets: Option<SourcePath>,
  pub package: Option<String>,
  pub manifest: Option<SourcePath>,
}

/// A concrete buildable unit.
///
/// Two rules are equal when every field matches; re-registering an equal rule
/// under the same target is a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
  pub target: BuildTarget,
  pub rule_type: &'static str,
  pub declared_deps: BTreeSet<BuildTarget>,
  pub extra_deps: BTreeSet<BuildTarget>,
  pub steps: Vec<Step>,
  pub output: Option<PathBuf>,
  pub cacheable: bool,
  /// Rule key inputs in schema order.
  pub key_fields: Vec<(&'static str, KeyValue)>,
  pub jvm: Option<JvmInfo>,
  pub android_resource: Option<AndroidResourceInfo>,
}

impl Rule {
  pub fn builder(params: RuleParams, rule_type: &'static str) -> RuleBuilder {
    RuleBuilder {
      rule: Rule {
        target: params.target,
        rule_type,
        declared_deps: params.declared_deps,
        extra_deps: params.extra_deps,
        steps: Vec::new(),
        output: None,
        cacheable: true,
        key_fields: Vec::new(),
        jvm: None,
        android_resource: None,
      },
    }
  }

  /// Declared and extra dependencies, deduplicated and ordered.
  pub fn deps(&self) -> BTreeSet<&BuildTarget> {
    self.declared_deps.iter().chain(self.extra_deps.iter()).collect()
  }

  pub fn key_field(&self, name: &str) -> Option<&KeyValue> {
    self.key_fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
  }
}

pub struct RuleBuilder {
  rule: Rule,
}

impl RuleBuilder {
  pub fn step(mut self, step: Step) -> Self {
    self.rule.steps.push(step);
    self
  }

  pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
    self.rule.steps.extend(steps);
    self
  }

  pub fn output(mut self, output: impl Into<PathBuf>) -> Self {
    self.rule.output = Some(output.into());
    self
  }

  pub fn cacheable(mut self, cacheable: bool) -> Self {
    self.rule.cacheable = cacheable;
    self
  }

  /// Append a rule key field. Field order is part of the key schema.
  pub fn key(mut self, name: &'static str, value: KeyValue) -> Self {
    self.rule.key_fields.push((name, value));
    self
  }

  pub fn jvm(mut self, info: JvmInfo) -> Self {
    self.rule.jvm = Some(info);
    self
  }

  pub fn android_resource(mut self, info: AndroidResourceInfo) -> Self {
    self.rule.android_resource = Some(info);
    self
  }

  pub fn build(self) -> Rule {
    self.rule
  }
}
