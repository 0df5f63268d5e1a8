use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ToolsConfig;
use crate::resolver::{ResolveError, RuleCtx};
use crate::rule::{CmdStep, Rule, RuleParams, Step, ZipEntry, gen_path, scratch_path};
use crate::rulekey::KeyValue;
use crate::target::BuildTarget;

use super::flavors::DUMMY_R_DOT_JAVA;

/// Builds the `#dummy_r_dot_java` rule an Android library compiles against.
///
/// The dummy `R` class carries placeholder ids for every resource reachable
/// through the library's first-order resource dependencies, so the library
/// compiles without the final resource table.
pub struct AndroidLibraryGraphEnhancer<'a> {
  dummy_target: BuildTarget,
  resource_union_package: Option<&'a str>,
  final_r_name: Option<&'a str>,
  tools: &'a ToolsConfig,
}

impl<'a> AndroidLibraryGraphEnhancer<'a> {
  pub fn new(
    target: &BuildTarget,
    resource_union_package: Option<&'a str>,
    final_r_name: Option<&'a str>,
    tools: &'a ToolsConfig,
  ) -> Self {
    Self {
      dummy_target: target.with_appended_flavor(DUMMY_R_DOT_JAVA),
      resource_union_package,
      final_r_name,
      tools,
    }
  }

  pub fn dummy_target(&self) -> &BuildTarget {
    &self.dummy_target
  }

  /// The dummy rule, or `None` when there are no resource dependencies and
  /// `create_if_empty` is false.
  pub fn create_dummy_r_dot_java(
    &self,
    ctx: &RuleCtx<'_>,
    declared_deps: &BTreeSet<BuildTarget>,
    create_if_empty: bool,
  ) -> Result<Option<Arc<Rule>>, ResolveError> {
    let mut resources = Vec::new();
    for dep in ctx.resolve_all(declared_deps)? {
      if let Some(info) = &dep.android_resource {
        resources.push((dep.target.clone(), info.res.clone()));
      }
    }

    if resources.is_empty() && !create_if_empty {
      return Ok(None);
    }

    let rule = ctx.index_synthetic(&self.dummy_target, || {
      let mut res_dirs = Vec::new();
      for res in resources.iter().filter_map(|(_, res)| res.as_ref()) {
        res_dirs.push(ctx.source_path(res)?);
      }
      Ok(self.build_rule(resources.iter().map(|(t, _)| t.clone()).collect(), &res_dirs))
    })?;
    Ok(Some(rule))
  }

  fn build_rule(&self, resource_deps: BTreeSet<BuildTarget>, res_dirs: &[PathBuf]) -> Rule {
    let target = &self.dummy_target;
    let output = gen_path(target, "%s/dummy_r.jar");
    let params = RuleParams::new(target.clone(), resource_deps.clone());

    let mut builder = Rule::builder(params, "dummy_r_dot_java")
      .output(output.clone())
      .key("resources", KeyValue::deps(&resource_deps))
      .key("resource_union_package", KeyValue::opt_str(self.resource_union_package))
      .key("final_r_name", KeyValue::opt_str(self.final_r_name));

    if !res_dirs.is_empty() {
      let src_dir = scratch_path(target, "%s__src");
      let classes_dir = scratch_path(target, "%s__classes");

      let mut generate = CmdStep::new(self.tools.aapt.as_str())
        .args(["package", "-f", "--non-constant-id", "-m", "-J"])
        .arg(src_dir.to_string_lossy());
      if let Some(package) = self.resource_union_package {
        generate = generate.args(["--custom-package", package]);
      }
      for dir in res_dirs {
        generate = generate.arg("-S").arg(dir.to_string_lossy());
      }

      let compile = CmdStep::new(self.tools.shell.as_str()).arg("-c").arg(format!(
        "{} -d {} $(find {} -name '*.java')",
        self.tools.javac,
        classes_dir.display(),
        src_dir.display()
      ));

      builder = builder.steps([
        Step::MakeCleanDir { path: src_dir },
        Step::Cmd(generate),
        Step::MakeCleanDir {
          path: classes_dir.clone(),
        },
        Step::Cmd(compile),
        Step::Zip {
          out: output,
          entries: vec![ZipEntry::new("", classes_dir)],
        },
      ]);
    }

    builder.build()
  }
}
