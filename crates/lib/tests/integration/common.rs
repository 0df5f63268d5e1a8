//! Shared helpers for build engine integration tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use kiln_lib::cache::DirCache;
use kiln_lib::config::ToolsConfig;
use kiln_lib::description::DescriptionRegistry;
use kiln_lib::execute::{BuildEngine, BuildReport, ExecuteConfig};
use kiln_lib::fs::{LocalFilesystem, StepContext, StepError, StepExecutor};
use kiln_lib::graph::TargetGraph;
use kiln_lib::resolver::RuleResolver;
use kiln_lib::rule::Step;
use kiln_lib::target::BuildTarget;
use tempfile::TempDir;

pub fn target(raw: &str) -> BuildTarget {
  BuildTarget::parse(raw).unwrap()
}

/// Wraps the local executor and counts the steps each rule ran.
///
/// In stub mode nothing is executed, so rules that need external compilers
/// can still be driven through the engine. Steps of `panic_on` panic.
pub struct CountingExecutor {
  inner: LocalFilesystem,
  stub: bool,
  panic_on: Option<BuildTarget>,
  steps: Mutex<BTreeMap<BuildTarget, usize>>,
}

impl CountingExecutor {
  pub fn steps_run(&self, target: &BuildTarget) -> usize {
    self.steps.lock().unwrap().get(target).copied().unwrap_or(0)
  }

  pub fn total_steps(&self) -> usize {
    self.steps.lock().unwrap().values().sum()
  }
}

impl StepExecutor for CountingExecutor {
  fn execute(&self, step: &Step, ctx: &StepContext<'_>) -> Result<(), StepError> {
    *self.steps.lock().unwrap().entry(ctx.target.clone()).or_insert(0) += 1;
    if self.panic_on.as_ref() == Some(ctx.target) {
      panic!("step of {} panicked", ctx.target);
    }
    if self.stub {
      return Ok(());
    }
    self.inner.execute(step, ctx)
  }
}

/// A project checkout and an artifact cache, both in temporary directories.
///
/// Every call to [`TestProject::build`] starts from a fresh resolver and
/// engine, the way separate build invocations would.
pub struct TestProject {
  pub root: TempDir,
  pub cache: TempDir,
}

impl TestProject {
  pub fn new() -> Self {
    Self {
      root: TempDir::new().unwrap(),
      cache: TempDir::new().unwrap(),
    }
  }

  pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
    self.root.path().join(relative)
  }

  pub fn write(&self, relative: &str, contents: &str) {
    let path = self.path(relative);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
  }

  pub fn read(&self, relative: impl AsRef<Path>) -> String {
    std::fs::read_to_string(self.path(relative)).unwrap()
  }

  pub fn remove_outputs(&self) {
    let out = self.path(kiln_lib::consts::OUT_DIR);
    if out.exists() {
      std::fs::remove_dir_all(out).unwrap();
    }
  }

  fn counting_executor(&self, stub: bool, panic_on: Option<BuildTarget>) -> Arc<CountingExecutor> {
    Arc::new(CountingExecutor {
      inner: LocalFilesystem::new(self.root.path()),
      stub,
      panic_on,
      steps: Mutex::new(BTreeMap::new()),
    })
  }

  pub fn executor(&self) -> Arc<CountingExecutor> {
    self.counting_executor(false, None)
  }

  pub fn stub_executor(&self) -> Arc<CountingExecutor> {
    self.counting_executor(true, None)
  }

  pub fn panicking_executor(&self, target: BuildTarget) -> Arc<CountingExecutor> {
    self.counting_executor(false, Some(target))
  }

  pub fn resolver(&self, graph_json: &str) -> Arc<RuleResolver> {
    let registry = DescriptionRegistry::with_defaults(&ToolsConfig::default());
    let mut graph = TargetGraph::from_json(graph_json).unwrap();
    graph.add_implicit_deps(&registry);
    Arc::new(RuleResolver::new(Arc::new(graph), Arc::new(registry)))
  }

  pub fn engine(&self, executor: Arc<CountingExecutor>) -> BuildEngine {
    let config = ExecuteConfig {
      parallelism: 4,
      root: self.root.path().to_path_buf(),
    };
    BuildEngine::new(
      config,
      Arc::new(LocalFilesystem::new(self.root.path())),
      executor,
      Arc::new(DirCache::new(self.cache.path())),
    )
  }

  pub async fn build(&self, graph_json: &str, targets: &[&str], executor: Arc<CountingExecutor>) -> BuildReport {
    let resolver = self.resolver(graph_json);
    let targets: Vec<BuildTarget> = targets.iter().map(|t| target(t)).collect();
    self.engine(executor).build(&resolver, &targets).await.unwrap()
  }
}
