use std::sync::Arc;

use crate::config::ToolsConfig;
use crate::enhance::AarGraphEnhancer;
use crate::enhance::flavors::{AAR_ANDROID_MANIFEST, AAR_ANDROID_RESOURCE, AAR_ASSEMBLE_ASSETS, AAR_ASSEMBLE_RESOURCE};
use crate::graph::{TargetArgs, TargetKind};
use crate::resolver::{ResolveError, RuleCtx};
use crate::rule::{Rule, RuleParams};
use crate::target::Flavor;

use super::{Description, args_mismatch, unrecognized_flavor};

pub struct AndroidAarDescription {
  tools: ToolsConfig,
}

impl AndroidAarDescription {
  pub fn new(tools: ToolsConfig) -> Self {
    Self { tools }
  }
}

impl Description for AndroidAarDescription {
  fn kind(&self) -> TargetKind {
    TargetKind::AndroidAar
  }

  fn synthetic_flavors(&self) -> &[Flavor] {
    const SYNTHETIC: &[Flavor] = &[
      AAR_ANDROID_MANIFEST,
      AAR_ASSEMBLE_ASSETS,
      AAR_ASSEMBLE_RESOURCE,
      AAR_ANDROID_RESOURCE,
    ];
    SYNTHETIC
  }

  fn create_rule(
    &self,
    ctx: &RuleCtx<'_>,
    params: RuleParams,
    args: &TargetArgs,
  ) -> Result<Arc<Rule>, ResolveError> {
    let TargetArgs::AndroidAar(args) = args else {
      return Err(args_mismatch(ctx, self.kind(), args));
    };
    if params.target.is_flavored() {
      return Err(unrecognized_flavor(&params.target));
    }

    let skeleton = args
      .manifest_skeleton
      .clone()
      .ok_or_else(|| ResolveError::InvalidArgument {
        target: params.target.clone(),
        message: "manifest_skeleton is required".to_string(),
      })?;

    let rule = AarGraphEnhancer::new(&self.tools, params, skeleton).enhance(ctx)?;
    Ok(Arc::new(rule))
  }
}
