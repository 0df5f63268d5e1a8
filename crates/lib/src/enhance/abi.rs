use std::collections::BTreeSet;
use std::path::Path;

use crate::config::ToolsConfig;
use crate::rule::{CmdStep, Rule, RuleParams, Step, gen_path};
use crate::rulekey::KeyValue;
use crate::target::BuildTarget;

use super::flavors::ABI;

pub fn abi_target(library: &BuildTarget) -> BuildTarget {
  library.with_appended_flavor(ABI)
}

/// Rule extracting the class ABI of `library`'s jar.
///
/// The key folds in the library jar's content hash, not the library's key, so
/// a change that leaves the jar identical keeps every dependent's key stable.
pub fn calculate_abi(tools: &ToolsConfig, library: &BuildTarget, library_jar: &Path) -> Rule {
  let target = abi_target(library);
  let output = gen_path(&target, "%s/abi.jar");

  let extract = match &tools.abi_tool {
    Some(tool) => Step::Cmd(
      CmdStep::new(tool.as_str())
        .arg(library_jar.to_string_lossy())
        .arg(output.to_string_lossy()),
    ),
    None => Step::Copy {
      from: library_jar.to_path_buf(),
      to: output.clone(),
    },
  };

  let params = RuleParams::new(target, BTreeSet::from([library.clone()]));
  let mut steps = Vec::with_capacity(2);
  if let Some(parent) = output.parent() {
    steps.push(Step::Mkdir {
      path: parent.to_path_buf(),
    });
  }
  steps.push(extract);

  Rule::builder(params, "calculate_abi")
    .steps(steps)
    .output(output)
    .key("binary_jar", KeyValue::BuiltOutput(library.clone()))
    .key("abi_tool", KeyValue::opt_str(tools.abi_tool.as_deref()))
    .build()
}
