use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::ToolsConfig;
use crate::enhance::flavors::{ABI, JAVADOC, MAVEN_JAR, SRC_JAR};
use crate::graph::{JvmLanguage, TargetArgs, TargetKind};
use crate::resolver::{ResolveError, RuleCtx};
use crate::rule::{Rule, RuleParams};
use crate::target::Flavor;

use super::jvm::{JvmLibrary, Packaging};
use super::{Description, args_mismatch};

const PACKAGING_FLAVORS: [Flavor; 3] = [SRC_JAR, JAVADOC, MAVEN_JAR];

pub struct JavaLibraryDescription {
  tools: ToolsConfig,
}

impl JavaLibraryDescription {
  pub fn new(tools: ToolsConfig) -> Self {
    Self { tools }
  }
}

impl Description for JavaLibraryDescription {
  fn kind(&self) -> TargetKind {
    TargetKind::JavaLibrary
  }

  fn has_flavors(&self, flavors: &BTreeSet<Flavor>) -> bool {
    flavors.iter().all(|f| PACKAGING_FLAVORS.contains(f))
  }

  fn synthetic_flavors(&self) -> &[Flavor] {
    const SYNTHETIC: &[Flavor] = &[ABI];
    SYNTHETIC
  }

  fn create_rule(
    &self,
    ctx: &RuleCtx<'_>,
    params: RuleParams,
    args: &TargetArgs,
  ) -> Result<Arc<Rule>, ResolveError> {
    let TargetArgs::JavaLibrary(args) = args else {
      return Err(args_mismatch(ctx, self.kind(), args));
    };

    if params.target.is_flavored() {
      let packaging = Packaging {
        tools: &self.tools,
        maven_coords: args.maven_coords.as_deref(),
        pom_template: args.maven_pom_template.as_ref(),
      };
      return packaging.create_flavored(ctx, params);
    }

    JvmLibrary {
      tools: &self.tools,
      rule_type: "java_library",
      language: JvmLanguage::Java,
      args,
      extra_classpath: Vec::new(),
      extra_key_fields: Vec::new(),
    }
    .create(ctx, params)
  }
}
