//! kiln-lib: target resolution, graph enhancement and incremental building.
//!
//! This crate turns a declared target graph into an action graph of concrete
//! rules and builds only what is stale:
//! - `BuildTarget`: cell + path + name + flavors, the identity everything keys off
//! - `RuleResolver`: memoizing registry that constructs each rule at most once
//! - `Description`: per-kind factories, some of which synthesize extra rules
//! - `RuleKeyEngine`: deterministic content fingerprints used as cache keys
//! - `execute`: wave-scheduled builds that consult an artifact cache

pub mod cache;
pub mod config;
pub mod consts;
pub mod description;
pub mod enhance;
pub mod execute;
pub mod fs;
pub mod graph;
pub mod resolver;
pub mod rule;
pub mod rulekey;
pub mod target;
pub mod util;
