use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_lib::fs::ContentReader;
use kiln_lib::rule::{Rule, RuleParams};
use kiln_lib::rulekey::{KeyValue, RuleKey, RuleKeyEngine};
use proptest::prelude::*;

use super::common::target;

/// Serves file contents from memory.
struct MemoryReader(HashMap<PathBuf, Vec<u8>>);

impl ContentReader for MemoryReader {
  fn read_content(&self, path: &Path) -> io::Result<Vec<u8>> {
    self
      .0
      .get(path)
      .cloned()
      .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
  }
}

fn reader(files: &[(&str, &str)]) -> Arc<MemoryReader> {
  Arc::new(MemoryReader(
    files
      .iter()
      .map(|(path, contents)| (PathBuf::from(path), contents.as_bytes().to_vec()))
      .collect(),
  ))
}

fn key_of(reader: Arc<MemoryReader>, fields: Vec<(&'static str, KeyValue)>) -> RuleKey {
  let mut builder = Rule::builder(RuleParams::new(target("//lib:lib"), BTreeSet::new()), "test_rule");
  for (name, value) in fields {
    builder = builder.key(name, value);
  }
  RuleKeyEngine::new(reader).compute_key(&builder.build(), &HashMap::new()).unwrap()
}

proptest! {
  #[test]
  fn set_order_never_changes_the_key(names in prop::collection::btree_set("[a-z]{1,8}", 1..8), seed in any::<u64>()) {
    let names: Vec<String> = names.into_iter().collect();
    let mut shuffled = names.clone();
    let len = shuffled.len();
    shuffled.rotate_left((seed as usize) % len);
    if seed % 2 == 0 {
      shuffled.reverse();
    }

    let set = |items: &[String]| KeyValue::Set(items.iter().map(|s| KeyValue::Str(s.clone())).collect());
    prop_assert_eq!(
      key_of(reader(&[]), vec![("names", set(&names))]),
      key_of(reader(&[]), vec![("names", set(&shuffled))])
    );
  }

  #[test]
  fn list_order_matters(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
    prop_assume!(a != b);
    let list = |items: [&String; 2]| KeyValue::strs(items);
    prop_assert_ne!(
      key_of(reader(&[]), vec![("names", list([&a, &b]))]),
      key_of(reader(&[]), vec![("names", list([&b, &a]))])
    );
  }
}

#[test]
fn file_keys_follow_content_not_name() {
  let files = [("a.txt", "same"), ("b.txt", "same"), ("c.txt", "other")];

  let a = key_of(reader(&files), vec![("src", KeyValue::File("a.txt".into()))]);
  let b = key_of(reader(&files), vec![("src", KeyValue::File("b.txt".into()))]);
  let c = key_of(reader(&files), vec![("src", KeyValue::File("c.txt".into()))]);
  assert_eq!(a, b);
  assert_ne!(a, c);

  let named_a = key_of(reader(&files), vec![("src", KeyValue::named_file("a.txt"))]);
  let named_b = key_of(reader(&files), vec![("src", KeyValue::named_file("b.txt"))]);
  assert_ne!(named_a, named_b);
}

#[test]
fn absent_differs_from_empty_string() {
  let absent = key_of(reader(&[]), vec![("proguard", KeyValue::Absent)]);
  let empty = key_of(reader(&[]), vec![("proguard", KeyValue::Str(String::new()))]);
  assert_ne!(absent, empty);
}

#[test]
fn adjacent_fields_cannot_run_together() {
  let split_early = key_of(
    reader(&[]),
    vec![("a", KeyValue::Str("x".into())), ("b", KeyValue::Str("yz".into()))],
  );
  let split_late = key_of(
    reader(&[]),
    vec![("a", KeyValue::Str("xy".into())), ("b", KeyValue::Str("z".into()))],
  );
  assert_ne!(split_early, split_late);
}
