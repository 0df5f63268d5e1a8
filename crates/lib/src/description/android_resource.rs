use std::sync::Arc;

use crate::graph::{TargetArgs, TargetKind};
use crate::resolver::{ResolveError, RuleCtx};
use crate::rule::{AndroidResourceInfo, Rule, RuleParams, Step, gen_path};
use crate::rulekey::KeyValue;

use super::{Description, args_mismatch};

/// Copies a resource directory, an assets directory and a manifest into one
/// staging directory and exposes them to enhancers.
pub struct AndroidResourceDescription;

impl Description for AndroidResourceDescription {
  fn kind(&self) -> TargetKind {
    TargetKind::AndroidResource
  }

  fn create_rule(
    &self,
    ctx: &RuleCtx<'_>,
    params: RuleParams,
    args: &TargetArgs,
  ) -> Result<Arc<Rule>, ResolveError> {
    let TargetArgs::AndroidResource(args) = args else {
      return Err(args_mismatch(ctx, self.kind(), args));
    };

    let output = gen_path(&params.target, "__%s_resources");
    let mut steps = vec![Step::MakeCleanDir { path: output.clone() }];
    if let Some(res) = &args.res {
      steps.push(Step::CopyDir {
        from: ctx.source_path(res)?,
        to: output.join("res"),
      });
    }
    if let Some(assets) = &args.assets {
      steps.push(Step::CopyDir {
        from: ctx.source_path(assets)?,
        to: output.join("assets"),
      });
    }
    if let Some(manifest) = &args.manifest {
      steps.push(Step::Copy {
        from: ctx.source_path(manifest)?,
        to: output.join("AndroidManifest.xml"),
      });
    }

    let deps = params.declared_deps.clone();
    let rule = Rule::builder(params, "android_resource")
      .steps(steps)
      .output(output)
      .key("res", KeyValue::opt_source(args.res.as_ref()))
      .key("assets", KeyValue::opt_source(args.assets.as_ref()))
      .key("package", KeyValue::opt_str(args.package.as_deref()))
      .key("manifest", KeyValue::opt_source(args.manifest.as_ref()))
      .key("deps", KeyValue::deps(&deps))
      .android_resource(AndroidResourceInfo {
        res: args.res.clone(),
        assets: args.assets.clone(),
        package: args.package.clone(),
        manifest: args.manifest.clone(),
      })
      .build();
    Ok(Arc::new(rule))
  }
}
