use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::packages::PackageManagerKind;

/// Settings read from `~/.ricething/config.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub restore: RestoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub package_manager: PackageManagerKind,

    /// Prefix install commands with `sudo` where the manager needs root
    #[serde(default = "default_use_sudo")]
    pub use_sudo: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Dotfiles added by `build --default-dotfiles`
    #[serde(default = "default_dotfiles")]
    pub default_dotfiles: Vec<String>,

    /// Glob patterns over `~/.config` folder names that are never bundled
    #[serde(default)]
    pub exclude_configs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Dotfiles copied back home whenever the bundle has them
    #[serde(default = "default_dotfiles")]
    pub dotfiles: Vec<String>,

    /// Abort `install` when the bundle was made on a different desktop
    #[serde(default)]
    pub strict_desktop: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            package_manager: PackageManagerKind::default(),
            use_sudo: default_use_sudo(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            default_dotfiles: default_dotfiles(),
            exclude_configs: Vec::new(),
        }
    }
}

impl Default for RestoreConfig {
    fn default() -> Self {
        RestoreConfig {
            dotfiles: default_dotfiles(),
            strict_desktop: false,
        }
    }
}

fn default_use_sudo() -> bool {
    true
}

/// Login, profile and shell rc files
pub fn default_dotfiles() -> Vec<String> {
    vec![
        ".bashrc".to_string(),
        ".bash_profile".to_string(),
        ".profile".to_string(),
        ".zshrc".to_string(),
        ".zprofile".to_string(),
        ".zshenv".to_string(),
    ]
}

/// Facts about the machine we run on, read from the environment once at
/// startup and passed to the pipelines by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub home: PathBuf,
    /// `~/.config`
    pub config_root: PathBuf,
    /// Desktop session id, empty when unknown
    pub desktop: String,
    /// Login shell path, empty when unknown
    pub shell: String,
    pub os_release: PathBuf,
}

impl Host {
    pub fn from_env() -> Result<Self> {
        let home = dirs::home_dir().context("Failed to find home directory")?;

        let desktop = non_empty_var("XDG_SESSION_DESKTOP")
            .or_else(|| non_empty_var("XDG_CURRENT_DESKTOP"))
            .unwrap_or_default();
        let shell = non_empty_var("SHELL").unwrap_or_default();
        let os_release = non_empty_var("RICETHING_OS_RELEASE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/etc/os-release"));

        Ok(Host::with_home(home, desktop, shell, os_release))
    }

    /// Build a host rooted at `home`, with the config root at `home/.config`
    pub fn with_home(
        home: impl Into<PathBuf>,
        desktop: impl Into<String>,
        shell: impl Into<String>,
        os_release: impl Into<PathBuf>,
    ) -> Self {
        let home = home.into();
        Host {
            config_root: home.join(".config"),
            home,
            desktop: desktop.into(),
            shell: shell.into(),
            os_release: os_release.into(),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Failed to find home directory")?
        .join(".ricething")
        .join("config.toml"))
}

/// Expand `~` and environment variables in a user-supplied path
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(&raw).as_ref()),
    }
}

pub fn init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    save(config_path, &Config::default())
}

/// Load the config file, falling back to defaults when it doesn't exist.
pub fn load(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;

    for pattern in &config.capture.exclude_configs {
        glob::Pattern::new(pattern)
            .with_context(|| format!("Invalid exclude_configs pattern: {}", pattern))?;
    }

    Ok(config)
}

pub fn save(config_path: &Path, config: &Config) -> Result<()> {
    let toml_string = toml::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(config_path, toml_string).context("Failed to write config file")?;
    Ok(())
}

pub fn edit(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        init(config_path, false)?;
    }

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    let status = Command::new(&editor)
        .arg(config_path)
        .status()
        .with_context(|| format!("Failed to open editor: {}", editor))?;

    if !status.success() {
        anyhow::bail!("Editor exited with code: {:?}", status.code());
    }

    // Catch mistakes now rather than on the next build
    load(config_path)?;
    Ok(())
}
