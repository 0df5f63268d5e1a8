//! Project configuration.
//!
//! Settings come from `.kiln.toml` in the project root, then environment
//! overrides. Every field has a default, so a missing file is a valid
//! configuration.
//!
//! ```toml
//! [build]
//! parallelism = 8
//! cache_dir = "/var/cache/kiln"
//!
//! [tools]
//! javac = "/usr/lib/jvm/default/bin/javac"
//! kotlin_toolchain = "//tools:kotlin"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{APP_NAME, CONFIG_FILE_NAME, ENV_CACHE_DIR, ENV_CACHE_DISABLED, ENV_PARALLELISM};
use crate::target::BuildTarget;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {message}")]
  Read { path: PathBuf, message: String },

  #[error("invalid configuration: {0}")]
  Parse(#[from] toml::de::Error),

  #[error("invalid value '{value}' for {var}")]
  InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KilnConfig {
  pub build: BuildConfig,
  pub tools: ToolsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
  /// Maximum number of rules building at once.
  pub parallelism: usize,
  /// Artifact cache location. Defaults to the user cache directory.
  pub cache_dir: Option<PathBuf>,
  pub cache_enabled: bool,
  /// Project root; relative paths in rules resolve against it.
  pub root: Option<PathBuf>,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      parallelism: std::thread::available_parallelism().map_or(4, |n| n.get()),
      cache_dir: None,
      cache_enabled: true,
      root: None,
    }
  }
}

/// External tools invoked by rule steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
  pub javac: String,
  pub javadoc: String,
  pub kotlinc: String,
  pub scalac: String,
  pub aapt: String,
  pub shell: String,
  /// Extracts a class ABI: `<abi_tool> <input.jar> <output.jar>`. Without one
  /// the ABI jar is a copy of the library jar.
  pub abi_tool: Option<String>,
  /// Rule providing the Kotlin standard library, added to every Kotlin library.
  pub kotlin_toolchain: Option<BuildTarget>,
  pub scala_toolchain: Option<BuildTarget>,
}

impl Default for ToolsConfig {
  fn default() -> Self {
    Self {
      javac: "javac".to_string(),
      javadoc: "javadoc".to_string(),
      kotlinc: "kotlinc".to_string(),
      scalac: "scalac".to_string(),
      aapt: "aapt".to_string(),
      shell: "/bin/sh".to_string(),
      abi_tool: None,
      kotlin_toolchain: None,
      scala_toolchain: None,
    }
  }
}

impl KilnConfig {
  /// Load `<root>/.kiln.toml` if present, then apply environment overrides.
  pub fn load(root: &Path) -> Result<Self, ConfigError> {
    let path = root.join(CONFIG_FILE_NAME);
    let mut config = if path.exists() {
      let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
        path: path.clone(),
        message: e.to_string(),
      })?;
      debug!(path = %path.display(), "loading configuration");
      Self::from_toml_str(&raw)?
    } else {
      Self::default()
    };

    if config.build.root.is_none() {
      config.build.root = Some(root.to_path_buf());
    }
    config.apply_env()?;
    Ok(config)
  }

  pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
    Ok(toml::from_str(raw)?)
  }

  /// Apply `KILN_PARALLELISM`, `KILN_CACHE_DIR` and `KILN_CACHE_DISABLED`.
  pub fn apply_env(&mut self) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(ENV_PARALLELISM) {
      self.build.parallelism = match value.parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => {
          return Err(ConfigError::InvalidEnv {
            var: ENV_PARALLELISM,
            value,
          });
        }
      };
    }
    if let Ok(value) = std::env::var(ENV_CACHE_DIR)
      && !value.is_empty()
    {
      self.build.cache_dir = Some(PathBuf::from(value));
    }
    if let Ok(value) = std::env::var(ENV_CACHE_DISABLED) {
      match value.as_str() {
        "1" | "true" | "yes" => self.build.cache_enabled = false,
        "0" | "false" | "no" | "" => {}
        _ => {
          return Err(ConfigError::InvalidEnv {
            var: ENV_CACHE_DISABLED,
            value,
          });
        }
      }
    }
    Ok(())
  }

  pub fn root(&self) -> PathBuf {
    self.build.root.clone().unwrap_or_else(|| PathBuf::from("."))
  }

  /// Configured cache directory, else the user cache directory.
  pub fn cache_dir(&self) -> PathBuf {
    self.build.cache_dir.clone().unwrap_or_else(default_cache_dir)
  }
}

#[cfg(windows)]
fn default_cache_dir() -> PathBuf {
  let local_appdata = std::env::var("LOCALAPPDATA").unwrap_or_else(|_| ".".to_string());
  PathBuf::from(local_appdata).join(APP_NAME).join("Cache")
}

#[cfg(not(windows))]
fn default_cache_dir() -> PathBuf {
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".cache")))
    .unwrap_or_else(|_| PathBuf::from(".cache"));
  cache_home.join(APP_NAME)
}
