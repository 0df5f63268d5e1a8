//! Graph enhancement.
//!
//! Some targets expand into more than one rule: a JVM library also gets an
//! `#abi` rule its dependents key against, an Android library may need a dummy
//! `R` class, an AAR is assembled from four intermediate rules. Enhancers
//! build those extra rules and register them through [`RuleCtx::add_to_index`]
//! before the primary rule is returned, under flavors reserved for that purpose.
//!
//! [`RuleCtx::add_to_index`]: crate::resolver::RuleCtx::add_to_index

mod aar;
mod abi;
mod android_library;
pub mod flavors;

pub use aar::*;
pub use abi::*;
pub use android_library::*;
