//! `ricething build`: snapshot the running desktop into a bundle directory.
//!
//! Only creating the output directory and writing the manifest can fail the
//! run. Everything after that is attempted item by item and recorded in the
//! returned [`CaptureReport`].

use anyhow::{Context, Result};
use chrono::Utc;
use glob::Pattern;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cfg::{Config, Host};
use crate::copy;
use crate::manifest::{self, Manifest, Package, BUNDLE_CONFIG_DIR};
use crate::packages::{self, PackageManager};
use crate::report::{ItemKind, ItemOutcome, Outcomes, Status};
use crate::ui;

#[derive(Debug, Clone)]
pub struct CaptureOpts {
    /// Bundle directory, created if missing
    pub output: PathBuf,
    pub skip_configs: bool,
    pub skip_packages: bool,
    /// Dotfiles named explicitly, relative to home
    pub dotfiles: Vec<String>,
    /// Also bundle the configured default dotfiles
    pub default_dotfiles: bool,
}

impl Default for CaptureOpts {
    fn default() -> Self {
        CaptureOpts {
            output: PathBuf::from("."),
            skip_configs: false,
            skip_packages: false,
            dotfiles: Vec::new(),
            default_dotfiles: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureReport {
    pub manifest_path: PathBuf,
    pub manifest: Manifest,
    pub outcomes: Outcomes,
}

/// Split a comma-separated dotfile list, trimming entries and dropping
/// empty ones.
pub fn parse_dotfile_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Defaults (when requested) followed by the explicit entries, keeping the
/// first occurrence of each.
pub fn dotfile_set(defaults: &[String], explicit: &[String]) -> Vec<String> {
    let mut set: Vec<String> = Vec::new();
    for entry in defaults.iter().chain(explicit) {
        if !set.contains(entry) {
            set.push(entry.clone());
        }
    }
    set
}

/// Names of the immediate subdirectories of `config_root`, sorted by name,
/// minus any matching an exclude pattern.
pub fn list_config_folders(config_root: &Path, exclude: &[Pattern]) -> Result<Vec<String>> {
    let entries = fs::read_dir(config_root)
        .with_context(|| format!("Failed to read config folder {}", config_root.display()))?;

    let mut folders = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("Failed to read config folder {}", config_root.display()))?;

        // Follows links so a folder symlinked in from a dotfiles repo counts
        if !entry.path().is_dir() {
            continue;
        }

        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                ui::warn(&format!(
                    "Skipping config folder with non UTF-8 name: {}",
                    raw.to_string_lossy()
                ));
                continue;
            }
        };

        if exclude.iter().any(|p| p.matches(&name)) {
            continue;
        }

        folders.push(name);
    }

    folders.sort();
    Ok(folders)
}

pub fn capture(
    host: &Host,
    config: &Config,
    package_manager: &dyn PackageManager,
    opts: &CaptureOpts,
) -> Result<CaptureReport> {
    let output = &opts.output;

    // Step 1: config folders
    let folders = if opts.skip_configs {
        Vec::new()
    } else {
        let exclude = exclude_patterns(config)?;
        match list_config_folders(&host.config_root, &exclude) {
            Ok(folders) => {
                ui::info(&format!(
                    "Found {} config folders in {}",
                    folders.len(),
                    host.config_root.display()
                ));
                folders
            }
            Err(e) => {
                ui::warn(&format!("{:#}", e));
                ui::hint("Continuing without config folders");
                Vec::new()
            }
        }
    };

    // Step 2: packages and distribution
    let (packages, system) = if opts.skip_packages {
        (Vec::new(), String::new())
    } else {
        (
            collect_packages(package_manager),
            collect_distribution(&host.os_release),
        )
    };

    // Step 3: dotfiles
    let defaults: &[String] = if opts.default_dotfiles {
        &config.capture.default_dotfiles
    } else {
        &[]
    };
    let mut outcomes = Outcomes::default();
    let mut dotfiles = Vec::new();
    for entry in dotfile_set(defaults, &opts.dotfiles) {
        if let Err(e) = manifest::validate_dotfile_path(&entry) {
            ui::warn(&format!("Ignoring {}", e));
            continue;
        }

        // Only dotfiles that exist are recorded in the manifest
        let src = host.home.join(&entry);
        if fs::symlink_metadata(&src).is_err() {
            ui::warn(&format!("Dotfile not found, skipping: {}", src.display()));
            outcomes.push(ItemOutcome {
                kind: ItemKind::Dotfile,
                name: entry,
                source: Some(src),
                dest: None,
                status: Status::Skipped("not found".to_string()),
            });
            continue;
        }

        dotfiles.push(entry);
    }

    // Step 4: the manifest is the one output that must succeed
    let manifest = Manifest {
        system,
        shell: host.shell.clone(),
        desktop: host.desktop.clone(),
        packages,
        config_folders: folders,
        dotfiles,
        hostname: hostname::get().ok().and_then(|h| h.into_string().ok()),
        created: Some(Utc::now()),
        ..Manifest::new()
    };

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;
    let manifest_path = Manifest::path_in(output);
    manifest.save(&manifest_path)?;
    ui::success(&format!("Metadata written to {}", manifest_path.display()));

    // Step 5: copy config folders
    if !opts.skip_configs {
        let bundle_config = output.join(BUNDLE_CONFIG_DIR);
        for folder in &manifest.config_folders {
            let src = host.config_root.join(folder);
            let dest = bundle_config.join(folder);
            outcomes.push(capture_folder(folder, &src, &dest, output));
        }
    }

    // Step 6: copy dotfiles
    for dotfile in &manifest.dotfiles {
        let src = host.home.join(dotfile);
        let dest = output.join(dotfile);
        outcomes.push(capture_dotfile(dotfile, &src, &dest, output));
    }

    Ok(CaptureReport {
        manifest_path,
        manifest,
        outcomes,
    })
}

fn exclude_patterns(config: &Config) -> Result<Vec<Pattern>> {
    config
        .capture
        .exclude_configs
        .iter()
        .map(|p| {
            Pattern::new(p).with_context(|| format!("Invalid exclude_configs pattern: {}", p))
        })
        .collect()
}

fn collect_packages(package_manager: &dyn PackageManager) -> Vec<Package> {
    let spinner = ui::spinner(&format!(
        "Querying installed packages ({})",
        package_manager.name()
    ));
    let result = package_manager.list_installed();
    spinner.finish_and_clear();

    match result {
        Ok(packages) => {
            ui::info(&format!("Found {} installed packages", packages.len()));
            packages
        }
        Err(e) => {
            ui::warn(&format!("Unable to list installed packages: {:#}", e));
            Vec::new()
        }
    }
}

fn collect_distribution(os_release: &Path) -> String {
    match packages::detect_distribution(os_release) {
        Ok(id) => id,
        Err(e) => {
            ui::warn(&format!("Unable to fetch distribution name: {:#}", e));
            String::new()
        }
    }
}

fn capture_folder(folder: &str, src: &Path, dest: &Path, output: &Path) -> ItemOutcome {
    let outcome = |status| ItemOutcome {
        kind: ItemKind::ConfigFolder,
        name: folder.to_string(),
        source: Some(src.to_path_buf()),
        dest: Some(dest.to_path_buf()),
        status,
    };

    // Bundling a folder into itself would never terminate
    if contains_path(src, output) {
        ui::warn(&format!(
            "Skipping {}: it contains the output directory",
            src.display()
        ));
        return outcome(Status::Skipped("contains the output directory".to_string()));
    }

    match copy::copy_tree(src, dest) {
        Ok(stats) => {
            ui::success(&format!("Copied {} → {}", src.display(), dest.display()));
            outcome(Status::Copied(stats))
        }
        Err(e) => {
            ui::error(&format!("Failed to copy {}: {:#}", folder, e));
            outcome(Status::Failed(format!("{:#}", e)))
        }
    }
}

fn capture_dotfile(dotfile: &str, src: &Path, dest: &Path, output: &Path) -> ItemOutcome {
    let outcome = |status| ItemOutcome {
        kind: ItemKind::Dotfile,
        name: dotfile.to_string(),
        source: Some(src.to_path_buf()),
        dest: Some(dest.to_path_buf()),
        status,
    };

    if fs::symlink_metadata(src).is_err() {
        ui::warn(&format!("Dotfile not found, skipping: {}", src.display()));
        return outcome(Status::Skipped("not found".to_string()));
    }

    if contains_path(src, output) {
        ui::warn(&format!(
            "Skipping {}: it contains the output directory",
            src.display()
        ));
        return outcome(Status::Skipped("contains the output directory".to_string()));
    }

    match copy::copy_entry(src, dest) {
        Ok(stats) => {
            ui::success(&format!("Copied {} → {}", src.display(), dest.display()));
            outcome(Status::Copied(stats))
        }
        Err(e) => {
            ui::error(&format!("Failed to copy {}: {:#}", dotfile, e));
            outcome(Status::Failed(format!("{:#}", e)))
        }
    }
}

/// Whether `inner` is `outer` or lies somewhere beneath it
fn contains_path(outer: &Path, inner: &Path) -> bool {
    match (fs::canonicalize(outer), fs::canonicalize(inner)) {
        (Ok(outer), Ok(inner)) => inner.starts_with(outer),
        _ => false,
    }
}
