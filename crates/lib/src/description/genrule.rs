use std::sync::Arc;

use crate::config::ToolsConfig;
use crate::graph::{TargetArgs, TargetKind};
use crate::resolver::{ResolveError, RuleCtx};
use crate::rule::{CmdStep, Rule, RuleParams, Step, gen_path};
use crate::rulekey::KeyValue;

use super::{Description, args_mismatch};

/// Runs a shell command producing one output.
///
/// The command sees `SRCS` (space separated source paths) and `OUT` in its
/// environment. A non-cacheable genrule is rebuilt on every build.
pub struct GenruleDescription {
  tools: ToolsConfig,
}

impl GenruleDescription {
  pub fn new(tools: ToolsConfig) -> Self {
    Self { tools }
  }
}

impl Description for GenruleDescription {
  fn kind(&self) -> TargetKind {
    TargetKind::Genrule
  }

  fn create_rule(
    &self,
    ctx: &RuleCtx<'_>,
    params: RuleParams,
    args: &TargetArgs,
  ) -> Result<Arc<Rule>, ResolveError> {
    let TargetArgs::Genrule(args) = args else {
      return Err(args_mismatch(ctx, self.kind(), args));
    };
    let missing = |field: &str| ResolveError::InvalidArgument {
      target: params.target.clone(),
      message: format!("genrule requires '{field}'"),
    };
    let cmd = args.cmd.as_deref().ok_or_else(|| missing("cmd"))?;
    let out = args.out.as_deref().ok_or_else(|| missing("out"))?;

    let out_dir = gen_path(&params.target, "%s");
    let output = out_dir.join(out);
    let srcs = ctx
      .source_paths(&args.srcs)?
      .iter()
      .map(|p| p.to_string_lossy().to_string())
      .collect::<Vec<_>>()
      .join(" ");

    let command = CmdStep::new(self.tools.shell.as_str())
      .arg("-c")
      .arg(cmd)
      .env("SRCS", srcs)
      .env("OUT", output.to_string_lossy());

    let deps = params.declared_deps.clone();
    let rule = Rule::builder(params, "genrule")
      .step(Step::MakeCleanDir { path: out_dir })
      .step(Step::Cmd(command))
      .output(output)
      .cacheable(args.cacheable)
      .key("cmd", KeyValue::Str(cmd.to_string()))
      .key("out", KeyValue::Str(out.to_string()))
      .key("srcs", KeyValue::sources(&args.srcs))
      .key("deps", KeyValue::deps(&deps))
      .build();
    Ok(Arc::new(rule))
  }
}
