use kiln_lib::execute::{BuildOutcome, RuleState};

use super::common::{TestProject, target};

const WEB_GRAPH: &str = r#"[
  {"target": "//web:lib", "type": "js_library", "srcs": ["web/a.js", "web/b.js"]},
  {"target": "//web:app", "type": "js_library", "srcs": ["web/main.js"], "deps": ["//web:lib"]}
]"#;

fn web_project() -> TestProject {
  let project = TestProject::new();
  project.write("web/a.js", "var a = 1;\n");
  project.write("web/b.js", "var b = 2;\n");
  project.write("web/main.js", "main();\n");
  project
}

#[tokio::test]
async fn first_build_runs_every_rule() {
  let project = web_project();
  let executor = project.executor();

  let report = project.build(WEB_GRAPH, &["//web:app"], executor.clone()).await;

  assert!(report.is_success());
  assert_eq!(report.rules_built, 2);
  assert_eq!(report.rules_fetched, 0);
  assert!(matches!(
    report.outcome(&target("//web:app")),
    Some(BuildOutcome::Built { .. })
  ));
  assert_eq!(project.read("kiln-out/gen/web/lib.js"), "var a = 1;\nvar b = 2;\n");
  assert_eq!(project.read("kiln-out/gen/web/app.js"), "main();\n");
}

#[tokio::test]
async fn unchanged_inputs_are_fetched_from_cache() {
  let project = web_project();
  let first = project.build(WEB_GRAPH, &["//web:app"], project.executor()).await;
  project.remove_outputs();

  let executor = project.executor();
  let second = project.build(WEB_GRAPH, &["//web:app"], executor.clone()).await;

  assert!(second.is_success());
  assert_eq!(second.rules_fetched, 2);
  assert_eq!(second.rules_built, 0);
  assert_eq!(executor.total_steps(), 0);
  assert_eq!(first.keys, second.keys);
  assert_eq!(project.read("kiln-out/gen/web/lib.js"), "var a = 1;\nvar b = 2;\n");
}

#[tokio::test]
async fn content_change_rebuilds_the_rule_and_its_dependents() {
  let project = web_project();
  let first = project.build(WEB_GRAPH, &["//web:app"], project.executor()).await;

  project.write("web/b.js", "var b = 3;\n");
  let executor = project.executor();
  let second = project.build(WEB_GRAPH, &["//web:app"], executor.clone()).await;

  assert_eq!(second.state(&target("//web:lib")), Some(RuleState::Built));
  assert_eq!(second.state(&target("//web:app")), Some(RuleState::Built));
  assert_ne!(first.keys[&target("//web:lib")], second.keys[&target("//web:lib")]);
  assert_ne!(first.keys[&target("//web:app")], second.keys[&target("//web:app")]);
  assert_eq!(project.read("kiln-out/gen/web/lib.js"), "var a = 1;\nvar b = 3;\n");
}

#[tokio::test]
async fn unrelated_change_keeps_other_rules_cached() {
  let project = web_project();
  project.build(WEB_GRAPH, &["//web:app"], project.executor()).await;

  project.write("web/main.js", "main(true);\n");
  let executor = project.executor();
  let report = project.build(WEB_GRAPH, &["//web:app"], executor.clone()).await;

  assert_eq!(report.state(&target("//web:lib")), Some(RuleState::Fetched));
  assert_eq!(report.state(&target("//web:app")), Some(RuleState::Built));
  assert_eq!(executor.steps_run(&target("//web:lib")), 0);
}

#[tokio::test]
async fn renaming_a_named_source_changes_the_key() {
  let project = web_project();
  let first = project.build(WEB_GRAPH, &["//web:lib"], project.executor()).await;

  project.write("web/c.js", "var b = 2;\n");
  let renamed = WEB_GRAPH.replace("web/b.js", "web/c.js");
  let second = project.build(&renamed, &["//web:lib"], project.executor()).await;

  assert_ne!(first.keys[&target("//web:lib")], second.keys[&target("//web:lib")]);
  assert_eq!(second.state(&target("//web:lib")), Some(RuleState::Built));
}

#[tokio::test]
async fn non_cacheable_rule_rebuilds_while_consumers_hit() {
  let project = TestProject::new();
  let graph = r#"[
    {"target": "//gen:stamp", "type": "genrule", "cmd": "printf stamp > \"$OUT\"", "out": "stamp.txt", "cacheable": false},
    {"target": "//web:app", "type": "js_library", "srcs": ["//gen:stamp"], "deps": ["//gen:stamp"]}
  ]"#;

  let first = project.build(graph, &["//web:app"], project.executor()).await;
  assert!(first.is_success(), "{:?}", first.failures);
  assert_eq!(project.read("kiln-out/gen/web/app.js"), "stamp");

  let executor = project.executor();
  let second = project.build(graph, &["//web:app"], executor.clone()).await;

  assert_eq!(second.state(&target("//gen:stamp")), Some(RuleState::Built));
  assert_eq!(second.state(&target("//web:app")), Some(RuleState::Fetched));
  assert!(executor.steps_run(&target("//gen:stamp")) > 0);
  assert_eq!(executor.steps_run(&target("//web:app")), 0);
  assert_eq!(first.keys[&target("//web:app")], second.keys[&target("//web:app")]);
}

#[tokio::test]
async fn consumer_rebuilds_when_a_source_producer_changes() {
  let project = TestProject::new();
  let graph = r#"[
    {"target": "//gen:a", "type": "genrule", "cmd": "printf one > \"$OUT\"", "out": "a.txt"},
    {"target": "//gen:b", "type": "genrule", "srcs": ["//gen:a"], "cmd": "cat $SRCS > \"$OUT\"", "out": "b.txt"}
  ]"#;

  let first = project.build(graph, &["//gen:b"], project.executor()).await;
  assert!(first.is_success(), "{:?}", first.failures);
  assert_eq!(project.read("kiln-out/gen/gen/b/b.txt"), "one");

  let changed = graph.replace("printf one", "printf two");
  let executor = project.executor();
  let second = project.build(&changed, &["//gen:b"], executor.clone()).await;

  assert!(second.is_success(), "{:?}", second.failures);
  assert_eq!(second.state(&target("//gen:a")), Some(RuleState::Built));
  assert_eq!(second.state(&target("//gen:b")), Some(RuleState::Built));
  assert_ne!(first.keys[&target("//gen:b")], second.keys[&target("//gen:b")]);
  assert!(executor.steps_run(&target("//gen:b")) > 0);
  assert_eq!(project.read("kiln-out/gen/gen/b/b.txt"), "two");
}

#[tokio::test]
async fn report_records_each_state_a_rule_passes_through() {
  let project = web_project();
  let lib = target("//web:lib");

  let first = project.build(WEB_GRAPH, &["//web:lib"], project.executor()).await;
  assert_eq!(
    first.transitions(&lib),
    [RuleState::Pending, RuleState::KeyComputed, RuleState::Building, RuleState::Built]
  );

  project.remove_outputs();
  let second = project.build(WEB_GRAPH, &["//web:lib"], project.executor()).await;
  assert_eq!(
    second.transitions(&lib),
    [RuleState::Pending, RuleState::KeyComputed, RuleState::Fetched]
  );
}

#[tokio::test]
async fn fetched_directory_output_keeps_consumers_cached() {
  let project = TestProject::new();
  let graph = r#"[
    {"target": "//gen:tree", "type": "genrule", "cmd": "mkdir -p \"$OUT/empty\" \"$OUT/sub\" && printf x > \"$OUT/sub/f\"", "out": "tree"},
    {"target": "//gen:use", "type": "genrule", "srcs": ["//gen:tree"], "cmd": "cat $SRCS/sub/f > \"$OUT\"", "out": "use.txt"}
  ]"#;

  let first = project.build(graph, &["//gen:use"], project.executor()).await;
  assert!(first.is_success(), "{:?}", first.failures);
  project.remove_outputs();

  let executor = project.executor();
  let second = project.build(graph, &["//gen:use"], executor.clone()).await;

  assert_eq!(second.state(&target("//gen:tree")), Some(RuleState::Fetched));
  assert_eq!(second.state(&target("//gen:use")), Some(RuleState::Fetched));
  assert_eq!(first.keys[&target("//gen:use")], second.keys[&target("//gen:use")]);
  assert_eq!(executor.total_steps(), 0);
}
