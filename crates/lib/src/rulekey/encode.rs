use std::collections::HashMap;

use crate::consts::KEY_SCHEMA_VERSION;
use crate::target::BuildTarget;

use super::{DepState, KeyError, KeyValue, RuleKeyEngine};

/// Serializes key fields into an unambiguous byte stream.
///
/// Every value carries a one-byte type tag and variable-length data carries a
/// length prefix. Set elements are encoded individually and sorted by their
/// encoding before being written.
pub(super) struct KeyEncoder<'a> {
  target: &'a BuildTarget,
  deps: &'a HashMap<BuildTarget, DepState>,
  engine: &'a RuleKeyEngine,
  buf: Vec<u8>,
}

impl<'a> KeyEncoder<'a> {
  pub(super) fn new(
    target: &'a BuildTarget,
    deps: &'a HashMap<BuildTarget, DepState>,
    engine: &'a RuleKeyEngine,
  ) -> Self {
    Self {
      target,
      deps,
      engine,
      buf: Vec::new(),
    }
  }

  pub(super) fn header(&mut self) {
    write_str(&mut self.buf, "kiln-rulekey");
    self.buf.extend_from_slice(&KEY_SCHEMA_VERSION.to_le_bytes());
  }

  pub(super) fn field(&mut self, name: &str, value: &KeyValue) -> Result<(), KeyError> {
    self.buf.push(b'F');
    write_str(&mut self.buf, name);
    let mut out = std::mem::take(&mut self.buf);
    let result = self.value(value, &mut out);
    self.buf = out;
    result
  }

  pub(super) fn finish(self) -> Vec<u8> {
    self.buf
  }

  fn value(&self, value: &KeyValue, out: &mut Vec<u8>) -> Result<(), KeyError> {
    match value {
      KeyValue::Absent => out.push(b'0'),
      KeyValue::Str(s) => {
        out.push(b's');
        write_str(out, s);
      }
      KeyValue::Int(i) => {
        out.push(b'i');
        out.extend_from_slice(&i.to_le_bytes());
      }
      KeyValue::Bool(b) => {
        out.push(b'b');
        out.push(u8::from(*b));
      }
      KeyValue::File(path) => {
        out.push(b'f');
        write_str(out, &self.engine.file_hash(self.target, path)?.0);
      }
      KeyValue::NamedFile { name, path } => {
        out.push(b'n');
        write_str(out, name);
        write_str(out, &self.engine.file_hash(self.target, path)?.0);
      }
      KeyValue::Dep(dep) => {
        out.push(b'd');
        write_str(out, &self.dep(dep)?.key.0);
      }
      KeyValue::Stringified(dep) => {
        let state = self.dep(dep)?;
        out.push(b'o');
        write_str(out, &dep.to_string());
        match &state.output {
          Some(path) => {
            out.push(b'p');
            write_str(out, &path.to_string_lossy().replace('\\', "/"));
          }
          None => out.push(b'0'),
        }
      }
      KeyValue::BuiltOutput(dep) => {
        out.push(b'h');
        write_str(out, &self.dep(dep)?.output_hash.0);
      }
      KeyValue::List(items) => {
        out.push(b'l');
        write_len(out, items.len());
        for item in items {
          self.value(item, out)?;
        }
      }
      KeyValue::Set(items) => {
        let mut encoded = Vec::with_capacity(items.len());
        for item in items {
          let mut element = Vec::new();
          self.value(item, &mut element)?;
          encoded.push(element);
        }
        encoded.sort();
        out.push(b'S');
        write_len(out, encoded.len());
        for element in encoded {
          write_len(out, element.len());
          out.extend_from_slice(&element);
        }
      }
      KeyValue::Map(entries) => {
        out.push(b'm');
        write_len(out, entries.len());
        for (key, value) in entries {
          write_str(out, key);
          self.value(value, out)?;
        }
      }
    }
    Ok(())
  }

  fn dep(&self, dep: &BuildTarget) -> Result<&'a DepState, KeyError> {
    self.deps.get(dep).ok_or_else(|| KeyError::DependencyNotReady {
      target: self.target.clone(),
      dep: dep.clone(),
    })
  }
}

fn write_len(out: &mut Vec<u8>, len: usize) {
  out.extend_from_slice(&(len as u64).to_le_bytes());
}

fn write_str(out: &mut Vec<u8>, s: &str) {
  write_len(out, s.len());
  out.extend_from_slice(s.as_bytes());
}
