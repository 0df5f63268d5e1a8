//! Target identity.
//!
//! A [`BuildTarget`] names one buildable unit: the cell it lives in, its base
//! path, a short name and a set of flavors requesting a derived view of it.
//! The canonical form is `cell//base/path:name#flavor_a,flavor_b` with flavors
//! sorted, and the unflavored target is always recoverable by clearing them.

mod types;

pub use types::*;
