use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::ToolsConfig;
use crate::enhance::AndroidLibraryGraphEnhancer;
use crate::enhance::flavors::{ABI, DUMMY_R_DOT_JAVA, SRC_JAR};
use crate::graph::{AndroidLibraryArgs, JvmLanguage, TargetArgs, TargetKind};
use crate::resolver::{ResolveError, RuleCtx};
use crate::rule::{Rule, RuleParams};
use crate::rulekey::KeyValue;
use crate::target::{BuildTarget, Flavor};

use super::jvm::{JvmLibrary, Packaging, RuleGatherer};
use super::{Description, args_mismatch};

pub struct AndroidLibraryDescription {
  tools: ToolsConfig,
}

impl AndroidLibraryDescription {
  pub fn new(tools: ToolsConfig) -> Self {
    Self { tools }
  }

  fn toolchain(&self, language: JvmLanguage) -> Option<&BuildTarget> {
    match language {
      JvmLanguage::Java => None,
      JvmLanguage::Kotlin => self.tools.kotlin_toolchain.as_ref(),
      JvmLanguage::Scala => self.tools.scala_toolchain.as_ref(),
    }
  }

  fn source_jar(
    &self,
    ctx: &RuleCtx<'_>,
    params: RuleParams,
    args: &AndroidLibraryArgs,
  ) -> Result<Arc<Rule>, ResolveError> {
    let base = ctx.base_rule()?;
    let packaging = Packaging {
      tools: &self.tools,
      maven_coords: args.java.maven_coords.as_deref(),
      pom_template: args.java.maven_pom_template.as_ref(),
    };
    let rule = packaging.source_jar(ctx, params, &base, RuleGatherer::SingleJar, args.java.maven_coords.clone())?;
    Ok(Arc::new(rule))
  }
}

impl Description for AndroidLibraryDescription {
  fn kind(&self) -> TargetKind {
    TargetKind::AndroidLibrary
  }

  fn has_flavors(&self, flavors: &BTreeSet<Flavor>) -> bool {
    match flavors.len() {
      0 => true,
      1 => flavors.contains(&SRC_JAR) || flavors.contains(&DUMMY_R_DOT_JAVA),
      _ => false,
    }
  }

  fn synthetic_flavors(&self) -> &[Flavor] {
    const SYNTHETIC: &[Flavor] = &[ABI];
    SYNTHETIC
  }

  fn find_implicit_deps(&self, _target: &BuildTarget, args: &TargetArgs) -> BTreeSet<BuildTarget> {
    match args {
      TargetArgs::AndroidLibrary(args) => self.toolchain(args.language).into_iter().cloned().collect(),
      _ => BTreeSet::new(),
    }
  }

  fn create_rule(
    &self,
    ctx: &RuleCtx<'_>,
    params: RuleParams,
    args: &TargetArgs,
  ) -> Result<Arc<Rule>, ResolveError> {
    let TargetArgs::AndroidLibrary(args) = args else {
      return Err(args_mismatch(ctx, self.kind(), args));
    };

    if params.target.has_flavor(&SRC_JAR) {
      return self.source_jar(ctx, params, args);
    }

    let base_target = params.target.unflavored();
    let enhancer = AndroidLibraryGraphEnhancer::new(
      &base_target,
      args.resource_union_package.as_deref(),
      args.final_r_name.as_deref(),
      &self.tools,
    );

    let dummy_requested = params.target.has_flavor(&DUMMY_R_DOT_JAVA);
    let dummy = enhancer.create_dummy_r_dot_java(ctx, &params.declared_deps, dummy_requested)?;
    if dummy_requested {
      return dummy.ok_or_else(|| ResolveError::InvalidArgument {
        target: params.target.clone(),
        message: "dummy R class was not created".to_string(),
      });
    }

    let mut params = params;
    let mut extra_classpath = Vec::new();
    if let Some(dummy) = dummy {
      params.extra_deps.insert(dummy.target.clone());
      extra_classpath.push(dummy);
    }
    if let Some(toolchain) = self.toolchain(args.language) {
      extra_classpath.push(ctx.resolve(toolchain)?);
    }

    JvmLibrary {
      tools: &self.tools,
      rule_type: "android_library",
      language: args.language,
      args: &args.java,
      extra_classpath,
      extra_key_fields: vec![
        ("manifest", KeyValue::opt_source(args.manifest.as_ref())),
        ("language", KeyValue::Str(args.language.as_str().to_string())),
        (
          "resource_union_package",
          KeyValue::opt_str(args.resource_union_package.as_deref()),
        ),
        ("final_r_name", KeyValue::opt_str(args.final_r_name.as_deref())),
      ],
    }
    .create(ctx, params)
  }
}
