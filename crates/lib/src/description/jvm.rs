//! Pieces shared by every JVM library kind: classpaths, compilation steps and
//! the packaging rules behind the `src_jar`, `javadoc` and `maven_jar` flavors.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ToolsConfig;
use crate::enhance::flavors::{JAVADOC, MAVEN_JAR, SRC_JAR};
use crate::enhance::{abi_target, calculate_abi};
use crate::graph::{JavaLibraryArgs, JvmLanguage};
use crate::resolver::{ResolveError, RuleCtx};
use crate::rule::{CmdStep, JvmInfo, Rule, RuleParams, SourcePath, Step, ZipEntry, gen_path, scratch_path};
use crate::rulekey::KeyValue;
use crate::target::BuildTarget;

use super::{MavenCoordinates, unrecognized_flavor};

/// Where a JVM library's jar lands.
pub fn library_jar_path(target: &BuildTarget) -> PathBuf {
  gen_path(target, "lib__%s__output/%s.jar")
}

/// Which rules a packaging flavor bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleGatherer {
  /// Only the library itself.
  SingleJar,
  /// The library plus every transitive JVM dependency without maven coordinates.
  MavenJar,
}

impl RuleGatherer {
  pub fn as_str(&self) -> &'static str {
    match self {
      RuleGatherer::SingleJar => "single_jar",
      RuleGatherer::MavenJar => "maven_jar",
    }
  }

  fn gather(&self, ctx: &RuleCtx<'_>, base: &Arc<Rule>) -> Result<Vec<Arc<Rule>>, ResolveError> {
    let mut rules = vec![base.clone()];
    if *self == RuleGatherer::MavenJar {
      let mut seen = BTreeSet::from([base.target.clone()]);
      collect_unpublished(ctx, base, &mut seen, &mut rules)?;
    }
    Ok(rules)
  }
}

fn collect_unpublished(
  ctx: &RuleCtx<'_>,
  rule: &Rule,
  seen: &mut BTreeSet<BuildTarget>,
  rules: &mut Vec<Arc<Rule>>,
) -> Result<(), ResolveError> {
  for dep in &rule.declared_deps {
    if !seen.insert(dep.clone()) {
      continue;
    }
    let dep_rule = ctx.resolve(dep)?;
    let unpublished = dep_rule
      .jvm
      .as_ref()
      .is_some_and(|jvm| jvm.maven_coords.is_none() && dep_rule.output.is_some());
    if unpublished {
      rules.push(dep_rule.clone());
      collect_unpublished(ctx, &dep_rule, seen, rules)?;
    }
  }
  Ok(())
}

/// Targets exported, directly or transitively, by `roots`.
fn exported_rules<'a>(
  ctx: &RuleCtx<'_>,
  roots: impl IntoIterator<Item = &'a BuildTarget>,
) -> Result<BTreeSet<BuildTarget>, ResolveError> {
  let mut exported = BTreeSet::new();
  let mut pending: Vec<BuildTarget> = roots.into_iter().cloned().collect();
  while let Some(target) = pending.pop() {
    let rule = ctx.resolve(&target)?;
    if let Some(jvm) = &rule.jvm {
      for dep in &jvm.exported_deps {
        if exported.insert(dep.clone()) {
          pending.push(dep.clone());
        }
      }
    }
  }
  Ok(exported)
}

struct Classpath {
  paths: Vec<PathBuf>,
  key: Vec<KeyValue>,
  /// `#abi` rules the key refers to.
  abi_deps: BTreeSet<BuildTarget>,
}

/// Jars of the JVM rules among `deps`. Keys use the ABI output where one exists.
fn compile_classpath(ctx: &RuleCtx<'_>, deps: &BTreeSet<BuildTarget>) -> Result<Classpath, ResolveError> {
  let mut classpath = Classpath {
    paths: Vec::new(),
    key: Vec::new(),
    abi_deps: BTreeSet::new(),
  };
  for rule in ctx.resolve_all(deps)? {
    let (Some(jvm), Some(output)) = (&rule.jvm, &rule.output) else {
      continue;
    };
    classpath.paths.push(output.clone());
    match &jvm.abi_target {
      Some(abi) => {
        classpath.key.push(KeyValue::BuiltOutput(abi.clone()));
        classpath.abi_deps.insert(abi.clone());
      }
      None => classpath.key.push(KeyValue::BuiltOutput(rule.target.clone())),
    }
  }
  Ok(classpath)
}

/// Name of a source inside a source or resource archive.
fn entry_name(target: &BuildTarget, root: Option<&str>, path: &Path) -> String {
  let normalized = path.to_string_lossy().replace('\\', "/");
  for prefix in root.into_iter().chain([target.base_path()]) {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
      continue;
    }
    if let Some(rest) = normalized.strip_prefix(&format!("{prefix}/")) {
      return rest.to_string();
    }
  }
  normalized
}

fn compiler(tools: &ToolsConfig, language: JvmLanguage) -> &str {
  match language {
    JvmLanguage::Java => &tools.javac,
    JvmLanguage::Kotlin => &tools.kotlinc,
    JvmLanguage::Scala => &tools.scalac,
  }
}

/// Builds the primary rule of a JVM library and registers its `#abi` rule.
pub(super) struct JvmLibrary<'a> {
  pub tools: &'a ToolsConfig,
  pub rule_type: &'static str,
  pub language: JvmLanguage,
  pub args: &'a JavaLibraryArgs,
  /// Built rules whose outputs go on the classpath regardless of facets.
  pub extra_classpath: Vec<Arc<Rule>>,
  pub extra_key_fields: Vec<(&'static str, KeyValue)>,
}

impl JvmLibrary<'_> {
  pub fn create(self, ctx: &RuleCtx<'_>, params: RuleParams) -> Result<Arc<Rule>, ResolveError> {
    let target = params.target.clone();
    let jar = library_jar_path(&target);
    let abi = abi_target(&target);
    ctx.index_synthetic(&abi, || Ok(calculate_abi(self.tools, &target, &jar)))?;

    let exported = exported_rules(ctx, &params.declared_deps)?;
    let mut classpath_deps = params.declared_deps.clone();
    classpath_deps.extend(exported.iter().cloned());
    let mut classpath = compile_classpath(ctx, &classpath_deps)?;
    for rule in &self.extra_classpath {
      if let Some(output) = &rule.output {
        classpath.paths.push(output.clone());
        classpath.key.push(KeyValue::BuiltOutput(rule.target.clone()));
      }
    }

    let mut extra_deps = params.extra_deps.clone();
    extra_deps.extend(exported);
    extra_deps.extend(classpath.abi_deps.iter().cloned());
    let params = RuleParams { extra_deps, ..params };

    let args = self.args;
    let root = args.resources_root.as_deref();
    let srcs = ctx.source_paths(&args.srcs)?;
    let mut resources = Vec::new();
    let mut resource_keys = Vec::new();
    for resource in &args.resources {
      let path = ctx.source_path(resource)?;
      let name = entry_name(&target, root, &path);
      resource_keys.push(match resource {
        SourcePath::Path(p) => KeyValue::NamedFile {
          name: name.clone(),
          path: p.clone(),
        },
        SourcePath::Target(_) => KeyValue::named_source(resource),
      });
      resources.push((name, path));
    }

    let program = compiler(self.tools, self.language);
    let steps = self.compile_steps(&target, program, &srcs, &resources, &classpath.paths, &jar);

    let mut builder = Rule::builder(params, self.rule_type)
      .steps(steps)
      .output(jar)
      .key("srcs", KeyValue::named_sources(&args.srcs))
      .key("resources", KeyValue::Set(resource_keys))
      .key("source_level", KeyValue::opt_str(args.source_level.as_deref()))
      .key("target_level", KeyValue::opt_str(args.target_level.as_deref()))
      .key("extra_arguments", KeyValue::strs(&args.extra_arguments))
      .key("classpath", KeyValue::Set(classpath.key))
      .key(
        "postprocess_classes_commands",
        KeyValue::strs(&args.postprocess_classes_commands),
      )
      .key("proguard_config", KeyValue::opt_source(args.proguard_config.as_ref()))
      .key("resources_root", KeyValue::opt_str(root))
      .key("maven_coords", KeyValue::opt_str(args.maven_coords.as_deref()))
      .key("compiler", KeyValue::Str(program.to_string()));
    for (name, value) in self.extra_key_fields {
      builder = builder.key(name, value);
    }

    Ok(Arc::new(
      builder
        .jvm(JvmInfo {
          srcs: args.srcs.clone(),
          exported_deps: args.exported_deps.clone(),
          maven_coords: args.maven_coords.clone(),
          abi_target: Some(abi),
        })
        .build(),
    ))
  }

  fn compile_steps(
    &self,
    target: &BuildTarget,
    program: &str,
    srcs: &[PathBuf],
    resources: &[(String, PathBuf)],
    classpath: &[PathBuf],
    jar: &Path,
  ) -> Vec<Step> {
    let args = self.args;
    let classes = scratch_path(target, "lib__%s__classes");
    let mut steps = vec![Step::MakeCleanDir { path: classes.clone() }];

    if !srcs.is_empty() {
      let mut cmd = CmdStep::new(program).arg("-d").arg(classes.to_string_lossy());
      if !classpath.is_empty() {
        let joined = classpath
          .iter()
          .map(|p| p.to_string_lossy().to_string())
          .collect::<Vec<_>>()
          .join(":");
        cmd = cmd.arg("-classpath").arg(joined);
      }
      if self.language == JvmLanguage::Java {
        if let Some(level) = &args.source_level {
          cmd = cmd.args(["-source", level.as_str()]);
        }
        if let Some(level) = &args.target_level {
          cmd = cmd.args(["-target", level.as_str()]);
        }
      }
      cmd = cmd.args(&args.extra_arguments);
      cmd = cmd.args(srcs.iter().map(|p| p.to_string_lossy().to_string()));
      steps.push(Step::Cmd(cmd));
    }

    for (name, path) in resources {
      steps.push(Step::Copy {
        from: path.clone(),
        to: classes.join(name),
      });
    }

    for command in &args.postprocess_classes_commands {
      steps.push(Step::Cmd(
        CmdStep::new(self.tools.shell.as_str())
          .arg("-c")
          .arg(format!("{command} {}", classes.display())),
      ));
    }

    steps.push(Step::Zip {
      out: jar.to_path_buf(),
      entries: vec![ZipEntry::new("", classes)],
    });
    steps
  }
}

fn classify(ctx: &RuleCtx<'_>, coords: Option<&str>, classifier: &str) -> Result<Option<String>, ResolveError> {
  coords
    .map(|raw| {
      MavenCoordinates::add_classifier(raw, classifier).map_err(|message| ResolveError::InvalidArgument {
        target: ctx.target().clone(),
        message,
      })
    })
    .transpose()
}

/// Packaging inputs shared by the flavored views of a JVM library.
pub(super) struct Packaging<'a> {
  pub tools: &'a ToolsConfig,
  pub maven_coords: Option<&'a str>,
  pub pom_template: Option<&'a SourcePath>,
}

impl Packaging<'_> {
  /// Dispatch on the requested flavors: `javadoc` wins over `src_jar`, which
  /// wins over `maven_jar`. `maven_jar` alongside another flavor only changes
  /// which rules are gathered.
  pub fn create_flavored(&self, ctx: &RuleCtx<'_>, params: RuleParams) -> Result<Arc<Rule>, ResolveError> {
    let base = ctx.base_rule()?;
    let flavors = params.target.flavors().clone();
    let gatherer = if flavors.contains(&MAVEN_JAR) {
      RuleGatherer::MavenJar
    } else {
      RuleGatherer::SingleJar
    };

    let rule = if flavors.contains(&JAVADOC) {
      let coords = classify(ctx, self.maven_coords, "javadoc")?;
      self.javadoc(ctx, params, &base, gatherer, coords)?
    } else if flavors.contains(&SRC_JAR) {
      let coords = classify(ctx, self.maven_coords, "sources")?;
      self.source_jar(ctx, params, &base, gatherer, coords)?
    } else if flavors.contains(&MAVEN_JAR) {
      let coords = classify(ctx, self.maven_coords, "")?;
      self.maven_jar(ctx, params, &base, gatherer, coords)?
    } else {
      return Err(unrecognized_flavor(&params.target));
    };
    Ok(Arc::new(rule))
  }

  /// Archive of the sources of every gathered rule.
  pub fn source_jar(
    &self,
    ctx: &RuleCtx<'_>,
    params: RuleParams,
    base: &Arc<Rule>,
    gatherer: RuleGatherer,
    maven_coords: Option<String>,
  ) -> Result<Rule, ResolveError> {
    let sources = gathered_sources(ctx, base, gatherer)?;
    let output = gen_path(&params.target, &format!("%s/{}-sources.jar", base.target.name()));
    let params = params.append_extra_deps(sources.producers.clone());

    Ok(
      Rule::builder(params, "java_source_jar")
        .step(Step::Zip {
          out: output.clone(),
          entries: sources.entries,
        })
        .output(output)
        .key("sources", KeyValue::Set(sources.key))
        .key("gatherer", KeyValue::Str(gatherer.as_str().to_string()))
        .key("maven_coords", KeyValue::opt_str(maven_coords.as_deref()))
        .key("pom_template", KeyValue::opt_source(self.pom_template))
        .build(),
    )
  }

  fn javadoc(
    &self,
    ctx: &RuleCtx<'_>,
    params: RuleParams,
    base: &Arc<Rule>,
    gatherer: RuleGatherer,
    maven_coords: Option<String>,
  ) -> Result<Rule, ResolveError> {
    let target = params.target.clone();
    let sources = gathered_sources(ctx, base, gatherer)?;
    let deps: BTreeSet<BuildTarget> = sources.rules.iter().flat_map(|r| r.declared_deps.iter().cloned()).collect();
    let classpath = compile_classpath(ctx, &deps)?;

    let docs = scratch_path(&target, "%s__docs");
    let output = gen_path(&target, &format!("%s/{}-javadoc.jar", base.target.name()));

    let mut steps = vec![Step::MakeCleanDir { path: docs.clone() }];
    if !sources.paths.is_empty() {
      let mut cmd = CmdStep::new(self.tools.javadoc.as_str())
        .args(["-quiet", "-d"])
        .arg(docs.to_string_lossy());
      if !classpath.paths.is_empty() {
        let joined = classpath
          .paths
          .iter()
          .map(|p| p.to_string_lossy().to_string())
          .collect::<Vec<_>>()
          .join(":");
        cmd = cmd.arg("-classpath").arg(joined);
      }
      cmd = cmd.args(sources.paths.iter().map(|p| p.to_string_lossy().to_string()));
      steps.push(Step::Cmd(cmd));
    }
    steps.push(Step::Zip {
      out: output.clone(),
      entries: vec![ZipEntry::new("", docs)],
    });

    let mut extra = sources.producers.clone();
    extra.extend(sources.rules.iter().map(|r| r.target.clone()));
    extra.extend(classpath.abi_deps.iter().cloned());
    let params = params.append_extra_deps(extra);

    Ok(
      Rule::builder(params, "javadoc")
        .steps(steps)
        .output(output)
        .key("sources", KeyValue::Set(sources.key))
        .key("classpath", KeyValue::Set(classpath.key))
        .key("gatherer", KeyValue::Str(gatherer.as_str().to_string()))
        .key("maven_coords", KeyValue::opt_str(maven_coords.as_deref()))
        .key("pom_template", KeyValue::opt_source(self.pom_template))
        .key("javadoc", KeyValue::Str(self.tools.javadoc.clone()))
        .build(),
    )
  }

  fn maven_jar(
    &self,
    ctx: &RuleCtx<'_>,
    params: RuleParams,
    base: &Arc<Rule>,
    gatherer: RuleGatherer,
    maven_coords: Option<String>,
  ) -> Result<Rule, ResolveError> {
    let rules = gatherer.gather(ctx, base)?;
    let output = gen_path(&params.target, &format!("%s/{}.jar", base.target.name()));
    let jars: Vec<PathBuf> = rules.iter().filter_map(|r| r.output.clone()).collect();
    let params = params.append_extra_deps(rules.iter().map(|r| r.target.clone()));

    Ok(
      Rule::builder(params, "maven_uber_jar")
        .step(Step::MergeZips {
          out: output.clone(),
          inputs: jars,
        })
        .output(output)
        .key(
          "jars",
          KeyValue::List(rules.iter().map(|r| KeyValue::BuiltOutput(r.target.clone())).collect()),
        )
        .key("maven_coords", KeyValue::opt_str(maven_coords.as_deref()))
        .key("pom_template", KeyValue::opt_source(self.pom_template))
        .build(),
    )
  }
}

struct GatheredSources {
  rules: Vec<Arc<Rule>>,
  paths: Vec<PathBuf>,
  entries: Vec<ZipEntry>,
  key: Vec<KeyValue>,
  /// Rules producing generated sources.
  producers: BTreeSet<BuildTarget>,
}

fn gathered_sources(
  ctx: &RuleCtx<'_>,
  base: &Arc<Rule>,
  gatherer: RuleGatherer,
) -> Result<GatheredSources, ResolveError> {
  let rules = gatherer.gather(ctx, base)?;
  let mut gathered = GatheredSources {
    rules: Vec::new(),
    paths: Vec::new(),
    entries: Vec::new(),
    key: Vec::new(),
    producers: BTreeSet::new(),
  };

  for rule in &rules {
    let Some(jvm) = &rule.jvm else {
      continue;
    };
    for src in &jvm.srcs {
      let path = ctx.source_path(src)?;
      let name = entry_name(&rule.target, None, &path);
      gathered.key.push(match src {
        SourcePath::Path(p) => KeyValue::NamedFile {
          name: name.clone(),
          path: p.clone(),
        },
        SourcePath::Target(t) => {
          gathered.producers.insert(t.clone());
          KeyValue::named_source(src)
        }
      });
      gathered.entries.push(ZipEntry::new(name, path.clone()));
      gathered.paths.push(path);
    }
  }
  gathered.rules = rules;
  Ok(gathered)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn entry_names_strip_resources_root_then_base_path() {
    let target = BuildTarget::parse("//java/app:lib").unwrap();
    assert_eq!(
      entry_name(&target, None, Path::new("java/app/com/example/A.java")),
      "com/example/A.java"
    );
    assert_eq!(
      entry_name(&target, Some("java/app/res"), Path::new("java/app/res/config.properties")),
      "config.properties"
    );
    assert_eq!(entry_name(&target, None, Path::new("other/B.java")), "other/B.java");
  }

  #[test]
  fn library_jar_lives_under_gen() {
    let target = BuildTarget::parse("//java/app:lib").unwrap();
    assert_eq!(
      library_jar_path(&target),
      PathBuf::from("kiln-out/gen/java/app/lib__lib__output/lib.jar")
    );
  }
}
