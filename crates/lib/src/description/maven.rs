use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static COORDS_PATTERN: LazyLock<Option<Regex>> =
  LazyLock::new(|| Regex::new(r"^([^: ]+):([^: ]+)(:([^: ]*)(:([^: ]+))?)?:([^: ]+)$").ok());

/// Maven coordinates: `group:artifact[:extension[:classifier]]:version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenCoordinates {
  pub group: String,
  pub artifact: String,
  pub extension: Option<String>,
  pub classifier: Option<String>,
  pub version: String,
}

impl MavenCoordinates {
  pub fn parse(raw: &str) -> Result<Self, String> {
    let pattern = COORDS_PATTERN
      .as_ref()
      .ok_or_else(|| "maven coordinate pattern failed to compile".to_string())?;
    let caps = pattern
      .captures(raw)
      .ok_or_else(|| format!("bad maven coordinates '{raw}', expected group:artifact[:extension[:classifier]]:version"))?;
    let part = |i: usize| caps.get(i).map(|m| m.as_str().to_string()).filter(|s| !s.is_empty());

    Ok(Self {
      group: caps[1].to_string(),
      artifact: caps[2].to_string(),
      extension: part(4),
      classifier: part(6),
      version: caps[7].to_string(),
    })
  }

  /// `group:artifact:version`, dropping extension and classifier.
  pub fn normalized(&self) -> String {
    format!("{}:{}:{}", self.group, self.artifact, self.version)
  }

  /// Same artifact under another classifier. An empty classifier drops it.
  pub fn with_classifier(&self, classifier: &str) -> Self {
    Self {
      extension: Some(self.extension.clone().unwrap_or_else(|| "jar".to_string())),
      classifier: (!classifier.is_empty()).then(|| classifier.to_string()),
      ..self.clone()
    }
  }

  /// Re-classify raw coordinates, e.g. `g:a:1.0` + `sources` gives `g:a:jar:sources:1.0`.
  pub fn add_classifier(raw: &str, classifier: &str) -> Result<String, String> {
    Ok(Self::parse(raw)?.with_classifier(classifier).to_string())
  }
}

impl fmt::Display for MavenCoordinates {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.group, self.artifact)?;
    if let Some(extension) = &self.extension {
      write!(f, ":{extension}")?;
    }
    if let Some(classifier) = &self.classifier {
      write!(f, ":{classifier}")?;
    }
    write!(f, ":{}", self.version)
  }
}
