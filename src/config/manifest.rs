//! Mapping manifest (`dotsync.json`) loading.
//!
//! The `mappings` object is read entry by entry so repeated keys survive
//! parsing; the resolver rejects them instead of letting the last one win.
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::SyncError;
use crate::platform::{Category, Platform};

/// Explicit target override for one managed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    /// Normalized source key: `common/.zshrc` (qualified) or `.zshrc` (bare).
    pub key: String,
    /// Target as written in the manifest, before home expansion.
    pub target: String,
}

impl PathMapping {
    /// Create a mapping, normalizing separators and a leading `./` in `key`.
    #[must_use]
    pub fn new(key: &str, target: &str) -> Self {
        Self {
            key: normalize_key(key),
            target: target.to_string(),
        }
    }

    /// Category named by a qualified key, if any.
    #[must_use]
    pub fn category(&self) -> Option<Category> {
        self.split_qualified().map(|(category, _)| category)
    }

    /// Whether this mapping selects the file `relative_path` in `category`.
    #[must_use]
    pub fn selects(&self, category: Category, relative_path: &str) -> bool {
        match self.split_qualified() {
            Some((c, rest)) => c == category && rest == relative_path,
            None => self.key == relative_path,
        }
    }

    fn split_qualified(&self) -> Option<(Category, &str)> {
        let (head, rest) = self.key.split_once('/')?;
        let category = Category::from_dir_name(head)?;
        (!rest.is_empty()).then_some((category, rest))
    }
}

fn normalize_key(key: &str) -> String {
    let mut key = key.trim().replace('\\', "/");
    while let Some(rest) = key.strip_prefix("./") {
        key = rest.to_string();
    }
    key.trim_end_matches('/').to_string()
}

/// Platform filter of a setup action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionPlatform {
    /// Unix-like hosts only.
    Unix,
    /// Windows hosts only.
    Windows,
    /// Every host.
    #[default]
    Any,
}

/// Extra setup step run once during `init` (e.g. installing shell plugins).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetupAction {
    /// Display name used in logs and the summary.
    pub name: String,
    /// Host filter.
    #[serde(default)]
    pub platform: ActionPlatform,
    /// Program followed by its arguments.
    pub command: Vec<String>,
}

impl SetupAction {
    /// Whether this action runs on `platform`.
    #[must_use]
    pub const fn applies_to(&self, platform: &Platform) -> bool {
        match self.platform {
            ActionPlatform::Any => true,
            ActionPlatform::Unix => platform.is_unix(),
            ActionPlatform::Windows => platform.is_windows(),
        }
    }
}

/// Parsed mapping manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Mapping entries in document order, duplicates included.
    pub mappings: Vec<PathMapping>,
    /// Setup actions in document order.
    pub actions: Vec<SetupAction>,
}

/// Ordered `key -> target` pairs; unlike a map type, keeps repeated keys.
#[derive(Debug, Default)]
struct MappingEntries(Vec<(String, String)>);

impl<'de> Deserialize<'de> for MappingEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = MappingEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping source paths to target paths")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, target)) = map.next_entry::<String, String>()? {
                    entries.push((key, target));
                }
                Ok(MappingEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    mappings: MappingEntries,
    #[serde(default)]
    actions: Vec<SetupAction>,
}

impl Manifest {
    /// Parse a manifest from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] on malformed JSON, an empty mapping key
    /// or target, or an action without a command.
    pub fn from_json(text: &str) -> Result<Self, SyncError> {
        let raw: RawManifest = serde_json::from_str(text)
            .map_err(|e| SyncError::config(format!("invalid manifest: {e}")))?;

        let mut mappings = Vec::with_capacity(raw.mappings.0.len());
        for (key, target) in raw.mappings.0 {
            let mapping = PathMapping::new(&key, &target);
            if mapping.key.is_empty() {
                return Err(SyncError::config(format!("empty mapping key {key:?}")));
            }
            if mapping.target.trim().is_empty() {
                return Err(SyncError::config(format!(
                    "empty target for mapping {}",
                    mapping.key
                )));
            }
            mappings.push(mapping);
        }

        for action in &raw.actions {
            if action.command.first().is_none_or(|p| p.trim().is_empty()) {
                return Err(SyncError::config(format!(
                    "action {:?} has no command",
                    action.name
                )));
            }
        }

        Ok(Self {
            mappings,
            actions: raw.actions,
        })
    }

    /// Load the manifest at `path`; a missing file is an empty manifest.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] if the file exists but cannot be read, or
    /// [`SyncError::Config`] if it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(SyncError::io(path, e)),
        };
        Self::from_json(&text)
    }

    /// Add a mapping (builder style).
    #[must_use]
    pub fn with_mapping(mut self, key: &str, target: &str) -> Self {
        self.mappings.push(PathMapping::new(key, target));
        self
    }

    /// Actions that apply on `platform`, in document order.
    pub fn actions_for<'a>(
        &'a self,
        platform: &'a Platform,
    ) -> impl Iterator<Item = &'a SetupAction> + 'a {
        self.actions.iter().filter(|a| a.applies_to(platform))
    }
}

impl fmt::Display for ActionPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unix => "unix",
            Self::Windows => "windows",
            Self::Any => "any",
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::platform::Os;

    #[test]
    fn parses_mappings_and_actions() {
        let manifest = Manifest::from_json(
            r#"{
                "mappings": { "common/.zshrc": "/custom/.zshrc", ".vimrc": "~/.config/vim/vimrc" },
                "actions": [
                    { "name": "plugins", "platform": "unix", "command": ["sh", "-c", "true"] },
                    { "name": "everywhere", "command": ["git", "--version"] }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.mappings.len(), 2);
        assert_eq!(manifest.mappings[0].key, "common/.zshrc");
        assert_eq!(manifest.mappings[0].target, "/custom/.zshrc");
        assert_eq!(manifest.actions[0].platform, ActionPlatform::Unix);
        assert_eq!(manifest.actions[1].platform, ActionPlatform::Any);
    }

    #[test]
    fn duplicate_keys_are_preserved() {
        let manifest =
            Manifest::from_json(r#"{"mappings": {".zshrc": "/a", ".zshrc": "/b"}}"#).unwrap();
        assert_eq!(manifest.mappings.len(), 2);
        assert_eq!(manifest.mappings[1].target, "/b");
    }

    #[test]
    fn empty_object_is_empty_manifest() {
        assert_eq!(Manifest::from_json("{}").unwrap(), Manifest::default());
    }

    #[test]
    fn malformed_json_is_config_error() {
        let err = Manifest::from_json("{ not json").unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn unknown_top_level_field_is_config_error() {
        let err = Manifest::from_json(r#"{"mapping": {}}"#).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn non_string_target_is_config_error() {
        let err = Manifest::from_json(r#"{"mappings": {".zshrc": 3}}"#).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn action_without_command_is_config_error() {
        let err =
            Manifest::from_json(r#"{"actions": [{"name": "x", "command": []}]}"#).unwrap_err();
        assert!(err.to_string().contains("has no command"));
    }

    #[test]
    fn missing_file_is_empty_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::load(&dir.path().join("dotsync.json")).unwrap();
        assert!(manifest.mappings.is_empty());
        assert!(manifest.actions.is_empty());
    }

    #[test]
    fn keys_are_normalized() {
        assert_eq!(PathMapping::new("./common\\.zshrc", "/x").key, "common/.zshrc");
        assert_eq!(PathMapping::new(".config/nvim/", "/x").key, ".config/nvim");
    }

    #[test]
    fn qualified_key_selects_only_its_category() {
        let mapping = PathMapping::new("common/.zshrc", "/x");
        assert_eq!(mapping.category(), Some(Category::Common));
        assert!(mapping.selects(Category::Common, ".zshrc"));
        assert!(!mapping.selects(Category::Unix, ".zshrc"));
    }

    #[test]
    fn bare_key_selects_any_category() {
        let mapping = PathMapping::new(".zshrc", "/x");
        assert_eq!(mapping.category(), None);
        assert!(mapping.selects(Category::Common, ".zshrc"));
        assert!(mapping.selects(Category::Unix, ".zshrc"));
        assert!(!mapping.selects(Category::Unix, ".bashrc"));
    }

    #[test]
    fn actions_filtered_by_platform() {
        let manifest = Manifest::from_json(
            r#"{"actions": [
                { "name": "u", "platform": "unix", "command": ["true"] },
                { "name": "w", "platform": "windows", "command": ["cmd"] },
                { "name": "a", "command": ["git"] }
            ]}"#,
        )
        .unwrap();
        let unix = Platform::new(Os::Unix);
        let names: Vec<&str> = manifest
            .actions_for(&unix)
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, ["u", "a"]);
    }
}
