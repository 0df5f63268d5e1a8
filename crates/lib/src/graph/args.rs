use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::rule::SourcePath;
use crate::target::BuildTarget;

/// Source language of a JVM library.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JvmLanguage {
  #[default]
  Java,
  Kotlin,
  Scala,
}

impl JvmLanguage {
  pub fn as_str(&self) -> &'static str {
    match self {
      JvmLanguage::Java => "java",
      JvmLanguage::Kotlin => "kotlin",
      JvmLanguage::Scala => "scala",
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JavaLibraryArgs {
  pub srcs: BTreeSet<SourcePath>,
  pub resources: BTreeSet<SourcePath>,
  pub deps: BTreeSet<BuildTarget>,
  /// Exposed to dependents as if they depended on them directly.
  pub exported_deps: BTreeSet<BuildTarget>,
  /// On the compile classpath but never packaged.
  pub provided_deps: BTreeSet<BuildTarget>,
  pub source_level: Option<String>,
  pub target_level: Option<String>,
  pub extra_arguments: Vec<String>,
  pub postprocess_classes_commands: Vec<String>,
  pub proguard_config: Option<SourcePath>,
  pub resources_root: Option<String>,
  pub maven_coords: Option<String>,
  pub maven_pom_template: Option<SourcePath>,
  /// Test targets covering this library. Not dependencies.
  pub tests: BTreeSet<BuildTarget>,
}

impl JavaLibraryArgs {
  pub fn all_deps(&self) -> BTreeSet<BuildTarget> {
    self
      .deps
      .iter()
      .chain(&self.exported_deps)
      .chain(&self.provided_deps)
      .cloned()
      .collect()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AndroidLibraryArgs {
  #[serde(flatten)]
  pub java: JavaLibraryArgs,
  pub manifest: Option<SourcePath>,
  /// Package the dummy `R` class is generated in.
  pub resource_union_package: Option<String>,
  pub final_r_name: Option<String>,
  pub language: JvmLanguage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AndroidResourceArgs {
  pub res: Option<SourcePath>,
  pub assets: Option<SourcePath>,
  pub package: Option<String>,
  pub manifest: Option<SourcePath>,
  pub deps: BTreeSet<BuildTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AndroidAarArgs {
  #[serde(flatten)]
  pub library: AndroidLibraryArgs,
  pub manifest_skeleton: Option<SourcePath>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsLibraryArgs {
  pub srcs: BTreeSet<SourcePath>,
  pub deps: BTreeSet<BuildTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenruleArgs {
  pub srcs: BTreeSet<SourcePath>,
  pub cmd: Option<String>,
  pub out: Option<String>,
  pub deps: BTreeSet<BuildTarget>,
  pub cacheable: bool,
}

impl Default for GenruleArgs {
  fn default() -> Self {
    Self {
      srcs: BTreeSet::new(),
      cmd: None,
      out: None,
      deps: BTreeSet::new(),
      cacheable: true,
    }
  }
}

/// Kind-specific arguments of a target node. The `type` key selects the kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetArgs {
  JavaLibrary(JavaLibraryArgs),
  AndroidLibrary(AndroidLibraryArgs),
  AndroidResource(AndroidResourceArgs),
  AndroidAar(AndroidAarArgs),
  JsLibrary(JsLibraryArgs),
  Genrule(GenruleArgs),
}

/// Discriminant of [`TargetArgs`], used to look up a description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetKind {
  JavaLibrary,
  AndroidLibrary,
  AndroidResource,
  AndroidAar,
  JsLibrary,
  Genrule,
}

impl TargetKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      TargetKind::JavaLibrary => "java_library",
      TargetKind::AndroidLibrary => "android_library",
      TargetKind::AndroidResource => "android_resource",
      TargetKind::AndroidAar => "android_aar",
      TargetKind::JsLibrary => "js_library",
      TargetKind::Genrule => "genrule",
    }
  }
}

impl std::fmt::Display for TargetKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl TargetArgs {
  pub fn kind(&self) -> TargetKind {
    match self {
      TargetArgs::JavaLibrary(_) => TargetKind::JavaLibrary,
      TargetArgs::AndroidLibrary(_) => TargetKind::AndroidLibrary,
      TargetArgs::AndroidResource(_) => TargetKind::AndroidResource,
      TargetArgs::AndroidAar(_) => TargetKind::AndroidAar,
      TargetArgs::JsLibrary(_) => TargetKind::JsLibrary,
      TargetArgs::Genrule(_) => TargetKind::Genrule,
    }
  }

  /// Dependencies named in the arguments.
  pub fn declared_deps(&self) -> BTreeSet<BuildTarget> {
    match self {
      TargetArgs::JavaLibrary(args) => args.all_deps(),
      TargetArgs::AndroidLibrary(args) => args.java.all_deps(),
      TargetArgs::AndroidResource(args) => args.deps.clone(),
      TargetArgs::AndroidAar(args) => args.library.java.all_deps(),
      TargetArgs::JsLibrary(args) => args.deps.clone(),
      TargetArgs::Genrule(args) => args.deps.clone(),
    }
  }

  /// Every source path argument, in a stable order.
  pub fn source_paths(&self) -> Vec<&SourcePath> {
    fn jvm(args: &JavaLibraryArgs) -> Vec<&SourcePath> {
      args
        .srcs
        .iter()
        .chain(&args.resources)
        .chain(args.proguard_config.iter())
        .chain(args.maven_pom_template.iter())
        .collect()
    }

    match self {
      TargetArgs::JavaLibrary(args) => jvm(args),
      TargetArgs::AndroidLibrary(args) => {
        let mut paths = jvm(&args.java);
        paths.extend(args.manifest.iter());
        paths
      }
      TargetArgs::AndroidResource(args) => args
        .res
        .iter()
        .chain(args.assets.iter())
        .chain(args.manifest.iter())
        .collect(),
      TargetArgs::AndroidAar(args) => {
        let mut paths = jvm(&args.library.java);
        paths.extend(args.library.manifest.iter());
        paths.extend(args.manifest_skeleton.iter());
        paths
      }
      TargetArgs::JsLibrary(args) => args.srcs.iter().collect(),
      TargetArgs::Genrule(args) => args.srcs.iter().collect(),
    }
  }
}
