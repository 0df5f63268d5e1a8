//! Concrete, buildable rules.
//!
//! A [`Rule`] is what a description produces for one [`BuildTarget`]: its
//! dependency edges, the ordered steps that build it, where its output lands
//! and which fields feed its rule key. Rules reference each other by target,
//! never by pointer; the resolver owns every instance.
//!
//! # Submodules
//!
//! - `source_path` - [`SourcePath`], a file on disk or another rule's output
//! - `step` - [`Step`], the unit of work handed to a step executor
//! - `paths` - conventions for generated output locations
//!
//! [`BuildTarget`]: crate::target::BuildTarget

mod paths;
mod source_path;
mod step;
mod types;

pub use paths::*;
pub use source_path::*;
pub use step::*;
pub use types::*;
