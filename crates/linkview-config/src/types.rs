use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Languages the virtual-root marker file can be written in.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "de", "fr", "es", "zh", "ja"];

/// Human-readable duration (e.g., "200ms", "5m", "1h").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanDuration(pub std::time::Duration);

impl Default for HumanDuration {
    fn default() -> Self {
        HumanDuration(std::time::Duration::from_secs(0))
    }
}

impl HumanDuration {
    pub fn as_duration(&self) -> std::time::Duration {
        self.0
    }
}

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        let (num_str, unit) = if let Some(n) = s.strip_suffix("ms") {
            (n, "ms")
        } else if let Some(n) = s.strip_suffix('s') {
            (n, "s")
        } else if let Some(n) = s.strip_suffix('m') {
            (n, "m")
        } else if let Some(n) = s.strip_suffix('h') {
            (n, "h")
        } else {
            return Err(format!("Invalid duration format: {}", s));
        };

        let num: u64 = num_str
            .trim()
            .parse()
            .map_err(|_| format!("Invalid number in duration: {}", s))?;

        let duration = match unit {
            "ms" => std::time::Duration::from_millis(num),
            "s" => std::time::Duration::from_secs(num),
            "m" => std::time::Duration::from_secs(num * 60),
            _ => std::time::Duration::from_secs(num * 3600),
        };

        Ok(HumanDuration(duration))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        let millis = self.0.as_millis();

        if millis < 1000 {
            write!(f, "{}ms", millis)
        } else if secs < 60 || secs % 60 != 0 {
            write!(f, "{}s", secs)
        } else if secs < 3600 || secs % 3600 != 0 {
            write!(f, "{}m", secs / 60)
        } else {
            write!(f, "{}h", secs / 3600)
        }
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HumanDuration::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A workspace: a real directory whose files can be tagged and projected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Absolute path of the workspace root.
    pub root: String,
    /// Display name, defaults to the workspace id.
    #[serde(default)]
    pub name: Option<String>,
}

/// Top-level linkview configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LinkviewConfig {
    #[serde(default)]
    pub version: Option<String>,
    /// Path of the SQLite catalog holding files, tags and views.
    #[serde(default)]
    pub database: Option<String>,
    /// Hidden folder created under each workspace root to hold the views.
    #[serde(default)]
    pub virtual_dir: Option<String>,
    /// Reserved folder under the virtual root that passes never touch.
    #[serde(default)]
    pub thumbnail_dir: Option<String>,
    #[serde(default)]
    pub marker_language: Option<String>,
    /// How often `linkview watch` runs a reconciliation pass.
    #[serde(default)]
    pub reconcile_interval: Option<HumanDuration>,
    #[serde(default)]
    pub workspaces: IndexMap<String, WorkspaceConfig>,
}
