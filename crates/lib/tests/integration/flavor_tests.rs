use std::collections::BTreeSet;

use kiln_lib::execute::RuleState;

use super::common::{TestProject, target};

const JAVA_GRAPH: &str = r#"[
  {"target": "//java/util:util", "type": "java_library", "srcs": ["java/util/Strings.java"]},
  {"target": "//java/app:lib", "type": "java_library",
   "srcs": ["java/app/Main.java"], "deps": ["//java/util:util"],
   "maven_coords": "com.example:app:1.0"}
]"#;

fn java_project() -> TestProject {
  let project = TestProject::new();
  project.write("java/util/Strings.java", "class Strings {}\n");
  project.write("java/app/Main.java", "class Main {}\n");
  project
}

#[tokio::test]
async fn packaging_flavors_share_one_base_rule() {
  let project = java_project();
  let resolver = project.resolver(JAVA_GRAPH);
  let executor = project.stub_executor();
  let targets = [
    target("//java/app:lib#src_jar"),
    target("//java/app:lib#javadoc"),
    target("//java/app:lib#maven_jar"),
  ];

  let report = project.engine(executor).build(&resolver, &targets).await.unwrap();

  assert!(report.is_success(), "{:?}", report.failures);
  assert_eq!(resolver.construction_count(&target("//java/app:lib")), 1);
  assert!(report.keys.contains_key(&target("//java/app:lib")));
  assert!(resolver.get_rule_optional(&target("//java/app:lib#abi")).is_some());
  assert_eq!(report.keys_computed, report.states.len());
  assert_eq!(
    resolver.get_rule_optional(&target("//java/app:lib#src_jar")).unwrap().rule_type,
    "java_source_jar"
  );
}

#[tokio::test]
async fn abi_dependency_edge_is_built_before_consumers() {
  let project = java_project();
  let resolver = project.resolver(JAVA_GRAPH);

  let report = project
    .engine(project.stub_executor())
    .build(&resolver, &[target("//java/app:lib")])
    .await
    .unwrap();

  assert_eq!(report.state(&target("//java/util:util#abi")), Some(RuleState::Built));
  assert_eq!(report.state(&target("//java/app:lib")), Some(RuleState::Built));
}

#[tokio::test]
async fn unknown_flavor_is_a_resolution_failure() {
  let project = java_project();

  let report = project
    .build(JAVA_GRAPH, &["//java/app:lib#shared"], project.stub_executor())
    .await;

  assert_eq!(report.failed_roots(), vec![&target("//java/app:lib#shared")]);
}

#[tokio::test]
async fn dummy_r_class_is_an_extra_dependency() {
  let project = TestProject::new();
  project.write("res/values/strings.xml", "<resources/>\n");
  project.write("app/Main.java", "class Main {}\n");
  let graph = r#"[
    {"target": "//res:res", "type": "android_resource", "res": "res", "package": "com.example"},
    {"target": "//app:lib", "type": "android_library", "srcs": ["app/Main.java"], "deps": ["//res:res"]}
  ]"#;
  let resolver = project.resolver(graph);
  let dummy = target("//app:lib#dummy_r_dot_java");

  let lib = resolver.resolve(&target("//app:lib")).unwrap();
  assert!(lib.extra_deps.contains(&dummy));
  assert!(!lib.declared_deps.contains(&dummy));
  assert_eq!(lib.declared_deps, BTreeSet::from([target("//res:res")]));

  let report = project
    .engine(project.stub_executor())
    .build(&resolver, &[target("//app:lib")])
    .await
    .unwrap();
  assert!(report.is_success(), "{:?}", report.failures);
  assert_eq!(report.state(&dummy), Some(RuleState::Built));
}

#[tokio::test]
async fn aar_packages_resources_and_jars_of_its_deps() {
  let project = java_project();
  project.write("res/values/strings.xml", "<resources/>\n");
  project.write("app/AndroidManifest.xml", "<manifest/>\n");
  let graph = r#"[
    {"target": "//java/util:util", "type": "java_library", "srcs": ["java/util/Strings.java"]},
    {"target": "//res:res", "type": "android_resource", "res": "res", "package": "com.example"},
    {"target": "//app:aar", "type": "android_aar", "manifest_skeleton": "app/AndroidManifest.xml",
     "deps": ["//res:res", "//java/util:util"]}
  ]"#;
  let resolver = project.resolver(graph);

  let report = project
    .engine(project.stub_executor())
    .build(&resolver, &[target("//app:aar")])
    .await
    .unwrap();

  assert!(report.is_success(), "{:?}", report.failures);
  for part in [
    "aar_android_manifest",
    "aar_assemble_assets",
    "aar_assemble_resource",
    "aar_android_resource",
  ] {
    let part = target(&format!("//app:aar#{part}"));
    assert_eq!(report.state(&part), Some(RuleState::Built), "{part}");
  }
  assert_eq!(report.state(&target("//java/util:util")), Some(RuleState::Built));
}
