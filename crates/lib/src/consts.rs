//! Crate-wide constants.

pub const APP_NAME: &str = "kiln";

/// Root directory (relative to the project root) for every generated output.
pub const OUT_DIR: &str = "kiln-out";

/// Default configuration file name, looked up in the project root.
pub const CONFIG_FILE_NAME: &str = ".kiln.toml";

/// Marker written into a cache entry once all artifact files are in place.
pub const CACHE_COMPLETE_MARKER: &str = ".kiln-complete";

/// Bump when the rule key encoding changes so stale cache entries stop matching.
pub const KEY_SCHEMA_VERSION: u32 = 1;

pub const ENV_PARALLELISM: &str = "KILN_PARALLELISM";
pub const ENV_CACHE_DIR: &str = "KILN_CACHE_DIR";
pub const ENV_CACHE_DISABLED: &str = "KILN_CACHE_DISABLED";
