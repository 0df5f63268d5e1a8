use kiln_lib::execute::{BuildError, BuildOutcome, RuleState};
use kiln_lib::fs::StepError;
use kiln_lib::resolver::ResolveError;

use super::common::{TestProject, target};

const BROKEN_GRAPH: &str = r#"[
  {"target": "//tools:broken", "type": "genrule", "cmd": "exit 3", "out": "never.txt"},
  {"target": "//web:lib", "type": "js_library", "srcs": ["web/lib.js"], "deps": ["//tools:broken"]},
  {"target": "//web:app", "type": "js_library", "srcs": ["web/app.js"], "deps": ["//web:lib"]},
  {"target": "//web:other", "type": "js_library", "srcs": ["web/other.js"]}
]"#;

fn broken_project() -> TestProject {
  let project = TestProject::new();
  project.write("web/lib.js", "lib();\n");
  project.write("web/app.js", "app();\n");
  project.write("web/other.js", "other();\n");
  project
}

#[tokio::test]
async fn failure_skips_dependents_and_names_the_root_cause() {
  let project = broken_project();
  let executor = project.executor();

  let report = project.build(BROKEN_GRAPH, &["//web:app", "//web:other"], executor.clone()).await;

  assert!(!report.is_success());
  assert_eq!(report.failed_roots(), vec![&target("//tools:broken")]);
  assert!(matches!(
    report.failures.get(&target("//tools:broken")),
    Some(BuildError::StepExecutionFailure {
      source: StepError::CmdFailed { code: Some(3), .. },
      ..
    })
  ));

  assert_eq!(report.state(&target("//web:lib")), Some(RuleState::Skipped));
  assert_eq!(
    report.transitions(&target("//tools:broken")),
    [RuleState::Pending, RuleState::KeyComputed, RuleState::Building, RuleState::Failed]
  );
  assert_eq!(report.transitions(&target("//web:lib")), [RuleState::Pending, RuleState::Skipped]);
  match report.outcome(&target("//web:app")) {
    Some(BuildOutcome::Skipped { root_cause }) => assert_eq!(root_cause, &target("//tools:broken")),
    other => panic!("expected //web:app to be skipped, got {other:?}"),
  }
  assert_eq!(
    report.failure_chain(&target("//web:app")),
    vec![target("//web:app"), target("//web:lib"), target("//tools:broken")]
  );
  assert_eq!(executor.steps_run(&target("//web:app")), 0);

  assert_eq!(report.state(&target("//web:other")), Some(RuleState::Built));
  assert!(report.outcome(&target("//web:other")).unwrap().is_success());
}

#[tokio::test]
async fn failed_rules_are_not_cached() {
  let project = broken_project();
  project.build(BROKEN_GRAPH, &["//web:app"], project.executor()).await;

  let executor = project.executor();
  let report = project.build(BROKEN_GRAPH, &["//web:app"], executor.clone()).await;

  assert_eq!(report.state(&target("//tools:broken")), Some(RuleState::Failed));
  assert!(executor.steps_run(&target("//tools:broken")) > 0);
}

#[tokio::test]
async fn missing_source_fails_key_computation() {
  let project = TestProject::new();
  let graph = r#"[{"target": "//web:lib", "type": "js_library", "srcs": ["web/missing.js"]}]"#;

  let executor = project.executor();
  let report = project.build(graph, &["//web:lib"], executor.clone()).await;

  assert!(matches!(
    report.failures.get(&target("//web:lib")),
    Some(BuildError::InputUnavailable(_))
  ));
  assert_eq!(executor.total_steps(), 0);
}

#[tokio::test]
async fn unresolvable_target_fails_alone() {
  let project = broken_project();

  let report = project.build(BROKEN_GRAPH, &["//web:nope", "//web:other"], project.executor()).await;

  assert!(matches!(
    report.outcome(&target("//web:nope")),
    Some(BuildOutcome::Failed(BuildError::Resolve(ResolveError::NoSuchTarget(_))))
  ));
  assert_eq!(report.state(&target("//web:other")), Some(RuleState::Built));
}

#[tokio::test]
async fn cancelled_build_runs_no_steps() {
  let project = broken_project();
  let resolver = project.resolver(BROKEN_GRAPH);
  let executor = project.executor();
  let engine = project.engine(executor.clone());
  engine.cancel_flag().cancel();

  let report = engine.build(&resolver, &[target("//web:other")]).await.unwrap();

  assert!(matches!(
    report.outcome(&target("//web:other")),
    Some(BuildOutcome::Failed(BuildError::Cancelled))
  ));
  assert_eq!(executor.total_steps(), 0);
}

#[tokio::test]
async fn panicking_step_fails_its_rule_and_skips_dependents() {
  let project = broken_project();
  let graph = r#"[
    {"target": "//web:lib", "type": "js_library", "srcs": ["web/lib.js"]},
    {"target": "//web:app", "type": "js_library", "srcs": ["web/app.js"], "deps": ["//web:lib"]}
  ]"#;

  let executor = project.panicking_executor(target("//web:lib"));
  let report = project.build(graph, &["//web:app"], executor).await;

  assert_eq!(report.state(&target("//web:lib")), Some(RuleState::Failed));
  assert!(matches!(
    report.failures.get(&target("//web:lib")),
    Some(BuildError::Aborted(_))
  ));
  match report.outcome(&target("//web:app")) {
    Some(BuildOutcome::Skipped { root_cause }) => assert_eq!(root_cause, &target("//web:lib")),
    other => panic!("expected //web:app to be skipped, got {other:?}"),
  }
}
