//! End-to-end builds against a temporary project and cache.

mod common;

mod cache_tests;
mod failure_tests;
mod flavor_tests;
mod rulekey_tests;
