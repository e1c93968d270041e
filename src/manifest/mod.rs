//! The bundle manifest (`ricemetadata.json`).
//!
//! The manifest is written once by `build` and only ever read by
//! `install`. The JSON key for the distribution id is `name` and the
//! folder list is `configs`; bundles produced before the schema carried a
//! `version` field load as version 1.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path};
use thiserror::Error;

/// File name of the manifest at the bundle root
pub const MANIFEST_FILE: &str = "ricemetadata.json";

/// Subdirectory of the bundle mirroring `~/.config`
pub const BUNDLE_CONFIG_DIR: &str = "config";

/// Newest schema version this build can read
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("manifest schema version {found} is newer than supported version {supported}; upgrade ricething to restore this bundle")]
    UnsupportedVersion { found: u64, supported: u32 },

    #[error("manifest field `version` must be a non-negative integer")]
    MalformedVersion,

    #[error("invalid {kind} entry {entry:?}: {reason}")]
    InvalidEntry {
        kind: &'static str,
        entry: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "legacy_version")]
    pub version: u32,

    /// Distribution id. Serialized as `name` for compatibility with
    /// existing bundles.
    #[serde(rename = "name", default)]
    pub system: String,

    #[serde(default)]
    pub shell: String,

    #[serde(default)]
    pub desktop: String,

    #[serde(default)]
    pub packages: Vec<Package>,

    #[serde(rename = "configs", default)]
    pub config_folders: Vec<String>,

    #[serde(default)]
    pub dotfiles: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

fn legacy_version() -> u32 {
    1
}

impl Manifest {
    pub fn new() -> Self {
        Manifest {
            version: MANIFEST_VERSION,
            system: String::new(),
            shell: String::new(),
            desktop: String::new(),
            packages: Vec::new(),
            config_folders: Vec::new(),
            dotfiles: Vec::new(),
            hostname: None,
            created: None,
        }
    }

    /// Location of the manifest inside `bundle_root`
    pub fn path_in(bundle_root: &Path) -> std::path::PathBuf {
        bundle_root.join(MANIFEST_FILE)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest from {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))
    }

    /// Parse a manifest, checking the schema version before the typed parse
    /// so that a newer layout is reported as such rather than as a
    /// confusing field error.
    pub fn from_json(content: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(content).context("Manifest is not valid JSON")?;

        check_version(&value)?;

        let manifest: Manifest =
            serde_json::from_value(value).context("Manifest does not match the expected schema")?;
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize manifest")?;
        fs::write(path, content + "\n")
            .with_context(|| format!("Failed to write manifest to {}", path.display()))?;
        Ok(())
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

fn check_version(value: &serde_json::Value) -> Result<(), ManifestError> {
    let found = match value.get("version") {
        None | Some(serde_json::Value::Null) => return Ok(()),
        Some(v) => v.as_u64().ok_or(ManifestError::MalformedVersion)?,
    };

    if found > u64::from(MANIFEST_VERSION) {
        return Err(ManifestError::UnsupportedVersion {
            found,
            supported: MANIFEST_VERSION,
        });
    }

    Ok(())
}

/// A config folder entry must name an immediate child of the config root.
pub fn validate_folder_name(name: &str) -> Result<(), ManifestError> {
    let invalid = |reason| ManifestError::InvalidEntry {
        kind: "config folder",
        entry: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(invalid("name contains a path separator"));
    }
    if name == "." || name == ".." {
        return Err(invalid("name is a relative directory reference"));
    }

    Ok(())
}

/// A dotfile entry must be a home-relative path that stays inside home.
pub fn validate_dotfile_path(entry: &str) -> Result<(), ManifestError> {
    let invalid = |reason| ManifestError::InvalidEntry {
        kind: "dotfile",
        entry: entry.to_string(),
        reason,
    };

    if entry.is_empty() {
        return Err(invalid("path is empty"));
    }

    for component in Path::new(entry).components() {
        match component {
            Component::Normal(_) => {}
            Component::CurDir => return Err(invalid("path contains `.`")),
            Component::ParentDir => return Err(invalid("path escapes the home directory")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("path must be relative to the home directory"))
            }
        }
    }

    // Dotfiles share the bundle root with the manifest and the config tree
    if let Some(first) = Path::new(entry).components().next() {
        let first = first.as_os_str();
        if first == MANIFEST_FILE || first == BUNDLE_CONFIG_DIR {
            return Err(invalid("path collides with the bundle layout"));
        }
    }

    Ok(())
}

/// A package name must look like one pacman accepts and can never be
/// mistaken for an option.
pub fn validate_package_name(name: &str) -> Result<(), ManifestError> {
    let invalid = |reason| ManifestError::InvalidEntry {
        kind: "package",
        entry: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.starts_with('-') {
        return Err(invalid("name starts with `-`"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '+' | '-'))
    {
        return Err(invalid("name contains characters outside [A-Za-z0-9@._+-]"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Manifest {
        Manifest {
            system: "arch".to_string(),
            shell: "/bin/zsh".to_string(),
            desktop: "hyprland".to_string(),
            packages: vec![
                Package {
                    name: "foo".to_string(),
                    version: "1.0".to_string(),
                },
                Package {
                    name: "bar".to_string(),
                    version: "2.1".to_string(),
                },
            ],
            config_folders: vec!["kitty".to_string(), "waybar".to_string()],
            ..Manifest::new()
        }
    }

    #[test]
    fn test_serialized_keys() {
        let json = serde_json::to_value(sample()).unwrap();

        assert_eq!(json["name"], "arch");
        assert_eq!(json["desktop"], "hyprland");
        assert_eq!(json["shell"], "/bin/zsh");
        assert_eq!(json["configs"][1], "waybar");
        assert_eq!(json["packages"][0]["name"], "foo");
        assert_eq!(json["packages"][0]["version"], "1.0");
        assert_eq!(json["version"], 1);
        assert!(json.get("system").is_none());
        assert!(json.get("hostname").is_none());
    }

    #[test]
    fn test_save_is_indented_and_loads_back() {
        let temp = TempDir::new().unwrap();
        let path = Manifest::path_in(temp.path());
        let manifest = sample();

        manifest.save(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\n  \"name\": \"arch\""));

        assert_eq!(Manifest::load(&path).unwrap(), manifest);
    }

    #[test]
    fn test_legacy_manifest_without_version() {
        let legacy = r#"{
            "name": "arch",
            "desktop": "gnome",
            "packages": [{"name": "git", "version": "2.44.0-1"}],
            "configs": ["nvim"]
        }"#;

        let manifest = Manifest::from_json(legacy).unwrap();
        assert_eq!(manifest.version, 1);
        assert_eq!(manifest.system, "arch");
        assert_eq!(manifest.shell, "");
        assert_eq!(manifest.config_folders, vec!["nvim"]);
        assert!(manifest.dotfiles.is_empty());
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let newer = r#"{"version": 7, "name": "arch", "configs": {"not": "a list"}}"#;

        let err = Manifest::from_json(newer).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ManifestError>(),
            Some(&ManifestError::UnsupportedVersion {
                found: 7,
                supported: MANIFEST_VERSION
            })
        );
    }

    #[test]
    fn test_malformed_version_is_rejected() {
        let err = Manifest::from_json(r#"{"version": "one"}"#).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ManifestError>(),
            Some(&ManifestError::MalformedVersion)
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Manifest::from_json("not json").is_err());
        assert!(Manifest::from_json(r#"{"packages": "nope"}"#).is_err());
    }

    #[test]
    fn test_folder_name_validation() {
        assert!(validate_folder_name("nvim").is_ok());
        assert!(validate_folder_name(".hidden").is_ok());
        assert!(validate_folder_name("").is_err());
        assert!(validate_folder_name("..").is_err());
        assert!(validate_folder_name(".").is_err());
        assert!(validate_folder_name("../etc").is_err());
        assert!(validate_folder_name("a/b").is_err());
        assert!(validate_folder_name("a\\b").is_err());
    }

    #[test]
    fn test_dotfile_path_validation() {
        assert!(validate_dotfile_path(".bashrc").is_ok());
        assert!(validate_dotfile_path(".local/bin/wallpaper.sh").is_ok());
        assert!(validate_dotfile_path("").is_err());
        assert!(validate_dotfile_path("/etc/passwd").is_err());
        assert!(validate_dotfile_path("../.bashrc").is_err());
        assert!(validate_dotfile_path(".config/../../x").is_err());
    }

    #[test]
    fn test_dotfile_cannot_shadow_bundle_layout() {
        assert!(validate_dotfile_path(MANIFEST_FILE).is_err());
        assert!(validate_dotfile_path("config").is_err());
        assert!(validate_dotfile_path("config/kitty/kitty.conf").is_err());
        assert!(validate_dotfile_path(".config").is_ok());
        assert!(validate_dotfile_path(".local/config").is_ok());
    }

    #[test]
    fn test_package_name_validation() {
        assert!(validate_package_name("kitty").is_ok());
        assert!(validate_package_name("python-pip").is_ok());
        assert!(validate_package_name("gtk+3").is_ok());
        assert!(validate_package_name("lib32-glibc").is_ok());
        assert!(validate_package_name("ttf-font@2.0_x").is_ok());
        assert!(validate_package_name("").is_err());
        assert!(validate_package_name("--hookdir=/tmp/evil").is_err());
        assert!(validate_package_name("-Syu").is_err());
        assert!(validate_package_name("foo bar").is_err());
        assert!(validate_package_name("foo;rm").is_err());
        assert!(validate_package_name("../x").is_err());
    }
}
