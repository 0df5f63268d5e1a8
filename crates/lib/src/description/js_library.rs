use std::sync::Arc;

use crate::graph::{TargetArgs, TargetKind};
use crate::resolver::{ResolveError, RuleCtx};
use crate::rule::{Rule, RuleParams, Step, gen_path};
use crate::rulekey::KeyValue;

use super::{Description, args_mismatch};

/// Concatenates sources into `<name>.js`.
pub struct JsLibraryDescription;

impl Description for JsLibraryDescription {
  fn kind(&self) -> TargetKind {
    TargetKind::JsLibrary
  }

  fn create_rule(
    &self,
    ctx: &RuleCtx<'_>,
    params: RuleParams,
    args: &TargetArgs,
  ) -> Result<Arc<Rule>, ResolveError> {
    let TargetArgs::JsLibrary(args) = args else {
      return Err(args_mismatch(ctx, self.kind(), args));
    };

    let output = gen_path(&params.target, "%s.js");
    let srcs = ctx.source_paths(&args.srcs)?;
    let deps = params.declared_deps.clone();

    let rule = Rule::builder(params, "js_library")
      .step(Step::Concat {
        srcs,
        out: output.clone(),
      })
      .output(output)
      .key("srcs", KeyValue::List(args.srcs.iter().map(KeyValue::named_source).collect()))
      .key("deps", KeyValue::deps(&deps))
      .build();
    Ok(Arc::new(rule))
  }
}
