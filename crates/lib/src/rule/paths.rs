use std::path::PathBuf;

use crate::consts::OUT_DIR;
use crate::target::BuildTarget;

/// Directory holding generated outputs for every target under `target`'s base path.
pub fn gen_dir(target: &BuildTarget) -> PathBuf {
  join_base(PathBuf::from(OUT_DIR).join("gen"), target)
}

/// Generated output path for `target`.
///
/// Every `%s` in `format` is replaced with the short name plus flavors, so
/// flavored views of one target never collide on disk.
pub fn gen_path(target: &BuildTarget, format: &str) -> PathBuf {
  gen_dir(target).join(format.replace("%s", &target.short_name_with_flavors()))
}

/// Scratch path for intermediate files that are never cached.
pub fn scratch_path(target: &BuildTarget, format: &str) -> PathBuf {
  join_base(PathBuf::from(OUT_DIR).join("bin"), target).join(format.replace("%s", &target.short_name_with_flavors()))
}

fn join_base(mut root: PathBuf, target: &BuildTarget) -> PathBuf {
  if !target.cell().is_root() {
    root = root.join(format!("cell-{}", target.cell()));
  }
  for component in target.base_path().split('/').filter(|c| !c.is_empty()) {
    root = root.join(component);
  }
  root
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gen_path_substitutes_flavored_short_name() {
    let target = BuildTarget::parse("//java/app:lib#src_jar").unwrap();
    assert_eq!(
      gen_path(&target, "%s/lib-sources.jar"),
      PathBuf::from("kiln-out/gen/java/app/lib#src_jar/lib-sources.jar")
    );
  }

  #[test]
  fn non_root_cells_get_their_own_subtree() {
    let target = BuildTarget::parse("vendor//guava:guava").unwrap();
    assert_eq!(gen_dir(&target), PathBuf::from("kiln-out/gen/cell-vendor/guava"));
  }

  #[test]
  fn scratch_lives_outside_gen() {
    let target = BuildTarget::parse("//app:lib").unwrap();
    assert_eq!(scratch_path(&target, "%s__classes"), PathBuf::from("kiln-out/bin/app/lib__classes"));
  }
}
