//! Package manager capability and the parsing around it.
//!
//! The pipelines only ever talk to [`PackageManager`]; the command-backed
//! implementation lives in [`command`].

pub mod command;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::manifest::Package;

pub use command::CommandPackageManager;

/// What the build and install pipelines need from a package manager.
pub trait PackageManager {
    fn name(&self) -> &str;

    /// Whether the manager's binary can be found at all
    fn is_available(&self) -> bool;

    /// Every installed package with its version
    fn list_installed(&self) -> Result<Vec<Package>>;

    /// Install one package non-interactively, streaming the manager's
    /// output to the terminal. Blocks until the manager exits.
    fn install(&self, name: &str) -> Result<()>;

    /// The command line `install` would run, for dry runs
    fn describe_install(&self, name: &str) -> String;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManagerKind {
    #[default]
    Pacman,
    Paru,
}

impl fmt::Display for PackageManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageManagerKind::Pacman => write!(f, "pacman"),
            PackageManagerKind::Paru => write!(f, "paru"),
        }
    }
}

/// Parse `pacman -Q` style output: one `name version` pair per line.
/// Lines that don't split into exactly two tokens are dropped.
pub fn parse_package_list(output: &str) -> Vec<Package> {
    output
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            match (tokens.next(), tokens.next(), tokens.next()) {
                (Some(name), Some(version), None) => Some(Package {
                    name: name.to_string(),
                    version: version.to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Read the distribution id (`ID=`) from an os-release file.
pub fn detect_distribution(os_release: &Path) -> Result<String> {
    let content = fs::read_to_string(os_release)
        .with_context(|| format!("Failed to read {}", os_release.display()))?;

    parse_os_release_id(&content)
        .with_context(|| format!("No ID= line in {}", os_release.display()))
}

fn parse_os_release_id(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let value = line.trim().strip_prefix("ID=")?;
        let value = value.trim().trim_matches(|c: char| c == '"' || c == '\'');
        Some(value.to_lowercase())
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;

    /// In-memory package manager that records install calls.
    #[derive(Default)]
    pub struct FakePackages {
        pub installed: Vec<Package>,
        pub list_fails: bool,
        pub unavailable: bool,
        pub failing: HashSet<String>,
        pub install_calls: RefCell<Vec<String>>,
    }

    impl FakePackages {
        pub fn with_packages(pairs: &[(&str, &str)]) -> Self {
            FakePackages {
                installed: pairs
                    .iter()
                    .map(|(name, version)| Package {
                        name: name.to_string(),
                        version: version.to_string(),
                    })
                    .collect(),
                ..FakePackages::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.install_calls.borrow().clone()
        }
    }

    impl PackageManager for FakePackages {
        fn name(&self) -> &str {
            "fake"
        }

        fn is_available(&self) -> bool {
            !self.unavailable
        }

        fn list_installed(&self) -> Result<Vec<Package>> {
            if self.list_fails {
                anyhow::bail!("package database is locked");
            }
            Ok(self.installed.clone())
        }

        fn install(&self, name: &str) -> Result<()> {
            self.install_calls.borrow_mut().push(name.to_string());
            if self.failing.contains(name) {
                anyhow::bail!("target not found: {}", name);
            }
            Ok(())
        }

        fn describe_install(&self, name: &str) -> String {
            format!("fake install {}", name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_package_list() {
        let output = "foo 1.0\nbar 2.1-3\n\nbroken\nthree tokens here\n  spaced   0.9  \n";
        let packages = parse_package_list(output);

        let pairs: Vec<(&str, &str)> = packages
            .iter()
            .map(|p| (p.name.as_str(), p.version.as_str()))
            .collect();
        assert_eq!(pairs, vec![("foo", "1.0"), ("bar", "2.1-3"), ("spaced", "0.9")]);
    }

    #[test]
    fn test_parse_os_release_id() {
        let content = "NAME=\"Arch Linux\"\nPRETTY_NAME=\"Arch Linux\"\nID=arch\nID_LIKE=\"archlinux\"\n";
        assert_eq!(parse_os_release_id(content).as_deref(), Some("arch"));

        let quoted = "ID_LIKE=debian\nID=\"EndeavourOS\"\n";
        assert_eq!(parse_os_release_id(quoted).as_deref(), Some("endeavouros"));

        assert_eq!(parse_os_release_id("NAME=Foo\n"), None);
    }

    #[test]
    fn test_detect_distribution() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("os-release");
        fs::write(&path, "ID=manjaro\nID=ignored\n").unwrap();

        assert_eq!(detect_distribution(&path).unwrap(), "manjaro");
        assert!(detect_distribution(&temp.path().join("missing")).is_err());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(PackageManagerKind::Pacman.to_string(), "pacman");
        assert_eq!(PackageManagerKind::Paru.to_string(), "paru");
    }
}
