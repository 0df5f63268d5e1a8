use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ToolsConfig;
use crate::resolver::{ResolveError, RuleCtx};
use crate::rule::{AndroidResourceInfo, CmdStep, Rule, RuleParams, SourcePath, Step, ZipEntry, gen_path, scratch_path};
use crate::rulekey::KeyValue;
use crate::target::BuildTarget;

use super::flavors::{AAR_ANDROID_MANIFEST, AAR_ANDROID_RESOURCE, AAR_ASSEMBLE_ASSETS, AAR_ASSEMBLE_RESOURCE};

/// Everything packageable reachable from a set of rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageableCollection {
  pub resource_dirs: Vec<SourcePath>,
  pub assets_dirs: Vec<SourcePath>,
  pub manifests: Vec<SourcePath>,
  /// JVM rules with an output jar, in discovery order.
  pub jvm_rules: Vec<Arc<Rule>>,
}

/// Depth-first, dependencies before dependents, each rule visited once.
pub fn collect_packageables(
  ctx: &RuleCtx<'_>,
  roots: &BTreeSet<BuildTarget>,
) -> Result<PackageableCollection, ResolveError> {
  let mut collection = PackageableCollection::default();
  let mut visited = HashSet::new();
  for root in roots {
    visit(ctx, root, &mut visited, &mut collection)?;
  }
  Ok(collection)
}

fn visit(
  ctx: &RuleCtx<'_>,
  target: &BuildTarget,
  visited: &mut HashSet<BuildTarget>,
  collection: &mut PackageableCollection,
) -> Result<(), ResolveError> {
  if !visited.insert(target.clone()) {
    return Ok(());
  }
  let rule = ctx.resolve(target)?;
  for dep in rule.deps() {
    visit(ctx, dep, visited, collection)?;
  }

  if let Some(info) = &rule.android_resource {
    push_unique(&mut collection.resource_dirs, info.res.as_ref());
    push_unique(&mut collection.assets_dirs, info.assets.as_ref());
    push_unique(&mut collection.manifests, info.manifest.as_ref());
  }
  if rule.jvm.is_some() && rule.output.is_some() {
    collection.jvm_rules.push(rule);
  }
  Ok(())
}

fn push_unique(into: &mut Vec<SourcePath>, source: Option<&SourcePath>) {
  if let Some(source) = source
    && !into.contains(source)
  {
    into.push(source.clone());
  }
}

/// Builds the rules an `android_aar` target expands into.
pub struct AarGraphEnhancer<'a> {
  tools: &'a ToolsConfig,
  params: RuleParams,
  manifest_skeleton: SourcePath,
}

impl<'a> AarGraphEnhancer<'a> {
  pub fn new(tools: &'a ToolsConfig, params: RuleParams, manifest_skeleton: SourcePath) -> Self {
    Self {
      tools,
      params,
      manifest_skeleton,
    }
  }

  /// Register the manifest, assembled assets, assembled resources and resource
  /// rules, in that order, then return the aar rule depending on all of them.
  pub fn enhance(&self, ctx: &RuleCtx<'_>) -> Result<Rule, ResolveError> {
    let target = &self.params.target;
    let collection = collect_packageables(ctx, &self.params.declared_deps)?;

    let manifest = ctx.add_to_index(self.manifest_rule(ctx, &collection)?)?;

    let resource_only = |deps: &BTreeSet<BuildTarget>| -> Result<BTreeSet<BuildTarget>, ResolveError> {
      let mut only = BTreeSet::new();
      for rule in ctx.resolve_all(deps)? {
        if rule.android_resource.is_some() {
          only.insert(rule.target.clone());
        }
      }
      Ok(only)
    };
    let res_declared = resource_only(&self.params.declared_deps)?;
    let res_extra = resource_only(&self.params.extra_deps)?;

    let assets = ctx.add_to_index(assemble_directories(
      ctx,
      target.with_appended_flavor(AAR_ASSEMBLE_ASSETS),
      res_declared.clone(),
      res_extra.clone(),
      &collection.assets_dirs,
    )?)?;
    let resources = ctx.add_to_index(assemble_directories(
      ctx,
      target.with_appended_flavor(AAR_ASSEMBLE_RESOURCE),
      res_declared,
      res_extra,
      &collection.resource_dirs,
    )?)?;

    let android_resource = ctx.add_to_index(self.android_resource_rule(&manifest, &assets, &resources))?;

    Ok(self.aar_rule(&manifest, &assets, &resources, &android_resource, &collection))
  }

  fn manifest_rule(&self, ctx: &RuleCtx<'_>, collection: &PackageableCollection) -> Result<Rule, ResolveError> {
    let target = self.params.target.with_appended_flavor(AAR_ANDROID_MANIFEST);
    let output = gen_path(&target, "%s/AndroidManifest.xml");
    let skeleton = ctx.source_path(&self.manifest_skeleton)?;

    let mut params = self.params.copy_with_target(target);
    params.extra_deps.extend(self.manifest_skeleton.as_target().cloned());

    Ok(
      Rule::builder(params.clone(), "android_manifest")
        .step(Step::Copy {
          from: skeleton,
          to: output.clone(),
        })
        .output(output)
        .key("skeleton", KeyValue::source(&self.manifest_skeleton))
        .key("library_manifests", KeyValue::sources(&collection.manifests))
        .key("deps", KeyValue::deps(params.declared_deps.iter().chain(&params.extra_deps)))
        .build(),
    )
  }

  fn android_resource_rule(&self, manifest: &Rule, assets: &Rule, resources: &Rule) -> Rule {
    let target = self.params.target.with_appended_flavor(AAR_ANDROID_RESOURCE);
    let output = gen_path(&target, "%s");
    let deps = BTreeSet::from([manifest.target.clone(), assets.target.clone(), resources.target.clone()]);
    let params = RuleParams::new(target, deps.clone());

    let mut steps = vec![Step::MakeCleanDir { path: output.clone() }];
    if let (Some(res_dir), Some(manifest_out)) = (&resources.output, &manifest.output)
      && !resources.steps.is_empty()
    {
      steps.push(Step::Cmd(
        CmdStep::new(self.tools.aapt.as_str())
          .args(["package", "-f", "-m", "--output-text-symbols"])
          .arg(output.to_string_lossy())
          .arg("-M")
          .arg(manifest_out.to_string_lossy())
          .arg("-S")
          .arg(res_dir.to_string_lossy()),
      ));
    }

    Rule::builder(params, "android_resource")
      .steps(steps)
      .output(output)
      .key("res", KeyValue::Stringified(resources.target.clone()))
      .key("assets", KeyValue::Stringified(assets.target.clone()))
      .key("manifest", KeyValue::Stringified(manifest.target.clone()))
      .key("deps", KeyValue::deps(&deps))
      .android_resource(AndroidResourceInfo {
        res: Some(SourcePath::Target(resources.target.clone())),
        assets: Some(SourcePath::Target(assets.target.clone())),
        package: None,
        manifest: Some(SourcePath::Target(manifest.target.clone())),
      })
      .build()
  }

  fn aar_rule(
    &self,
    manifest: &Rule,
    assets: &Rule,
    resources: &Rule,
    android_resource: &Rule,
    collection: &PackageableCollection,
  ) -> Rule {
    let target = &self.params.target;
    let output = gen_path(target, "%s.aar");
    let staging = scratch_path(target, "%s__aar");
    let classes_jar = staging.join("classes.jar");

    let declared: BTreeSet<BuildTarget> = [manifest, assets, resources, android_resource]
      .iter()
      .map(|r| r.target.clone())
      .collect();
    let jvm_targets: Vec<BuildTarget> = collection.jvm_rules.iter().map(|r| r.target.clone()).collect();
    let jars: Vec<PathBuf> = collection.jvm_rules.iter().filter_map(|r| r.output.clone()).collect();
    let params = RuleParams::new(target.clone(), declared).append_extra_deps(jvm_targets.iter().cloned());

    let mut entries = Vec::new();
    if let Some(path) = &manifest.output {
      entries.push(ZipEntry::new("AndroidManifest.xml", path.clone()));
    }
    entries.push(ZipEntry::new("classes.jar", classes_jar.clone()));
    if !resources.steps.is_empty()
      && let Some(path) = &resources.output
    {
      entries.push(ZipEntry::new("res", path.clone()));
      if let Some(symbols) = &android_resource.output {
        entries.push(ZipEntry::new("R.txt", symbols.join("R.txt")));
      }
    }
    if !assets.steps.is_empty()
      && let Some(path) = &assets.output
    {
      entries.push(ZipEntry::new("assets", path.clone()));
    }

    let classes_step = if jars.is_empty() {
      Step::Zip {
        out: classes_jar,
        entries: Vec::new(),
      }
    } else {
      Step::MergeZips {
        out: classes_jar,
        inputs: jars,
      }
    };

    Rule::builder(params, "android_aar")
      .step(Step::MakeCleanDir { path: staging })
      .step(classes_step)
      .step(Step::Zip {
        out: output.clone(),
        entries,
      })
      .output(output)
      .key("manifest", KeyValue::Dep(manifest.target.clone()))
      .key("assembled_assets", KeyValue::Dep(assets.target.clone()))
      .key("assembled_resources", KeyValue::Dep(resources.target.clone()))
      .key("android_resource", KeyValue::Dep(android_resource.target.clone()))
      .key(
        "classes",
        KeyValue::List(jvm_targets.into_iter().map(KeyValue::BuiltOutput).collect()),
      )
      .build()
  }
}

/// Merge `inputs` into one directory. With no inputs the rule has no steps,
/// but its output path is still defined.
fn assemble_directories(
  ctx: &RuleCtx<'_>,
  target: BuildTarget,
  declared_deps: BTreeSet<BuildTarget>,
  extra_deps: BTreeSet<BuildTarget>,
  inputs: &[SourcePath],
) -> Result<Rule, ResolveError> {
  let output = gen_path(&target, "%s");
  let mut extra_deps = extra_deps;
  extra_deps.extend(inputs.iter().filter_map(SourcePath::as_target).cloned());
  let params = RuleParams {
    target,
    declared_deps,
    extra_deps,
  };

  let mut steps = Vec::new();
  if !inputs.is_empty() {
    steps.push(Step::MakeCleanDir { path: output.clone() });
    for dir in ctx.source_paths(inputs)? {
      steps.push(Step::CopyDir {
        from: dir,
        to: output.clone(),
      });
    }
  }

  let all_deps: BTreeSet<BuildTarget> = params.declared_deps.union(&params.extra_deps).cloned().collect();
  Ok(
    Rule::builder(params, "assemble_directories")
      .steps(steps)
      .output(output)
      .key("inputs", KeyValue::List(inputs.iter().map(KeyValue::source).collect()))
      .key("deps", KeyValue::deps(&all_deps))
      .build(),
  )
}
