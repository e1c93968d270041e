//! `ricething install`: replay a bundle onto this machine.
//!
//! The bundle directory and its manifest are the contract; without them
//! nothing runs. Past that point every package, config folder and dotfile
//! is handled on its own and failures only show up in the report.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cfg::{Config, Host};
use crate::copy;
use crate::manifest::{self, Manifest, BUNDLE_CONFIG_DIR};
use crate::packages::PackageManager;
use crate::report::{ItemKind, ItemOutcome, Outcomes, Status};
use crate::ui;

#[derive(Debug, Clone, Default)]
pub struct RestoreOpts {
    pub bundle: PathBuf,
    pub skip_packages: bool,
    pub skip_configs: bool,
    /// Refuse to restore a bundle made on another desktop
    pub strict_desktop: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesktopCheck {
    Match,
    Mismatch { bundle: String, host: String },
    /// One side doesn't know its desktop
    Unknown,
}

#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub manifest: Manifest,
    pub desktop: DesktopCheck,
    pub outcomes: Outcomes,
}

pub fn check_desktop(bundle_desktop: &str, host_desktop: &str) -> DesktopCheck {
    let bundle = bundle_desktop.trim();
    let host = host_desktop.trim();

    if bundle.is_empty() || host.is_empty() {
        DesktopCheck::Unknown
    } else if bundle.eq_ignore_ascii_case(host) {
        DesktopCheck::Match
    } else {
        DesktopCheck::Mismatch {
            bundle: bundle.to_string(),
            host: host.to_string(),
        }
    }
}

/// Read the manifest of the bundle at `bundle`, which must be a directory.
pub fn load_bundle(bundle: &Path) -> Result<Manifest> {
    if !bundle.is_dir() {
        anyhow::bail!("{} is not a directory", bundle.display());
    }

    Manifest::load(&Manifest::path_in(bundle))
        .with_context(|| format!("{} is not a ricething bundle", bundle.display()))
}

pub fn restore(
    host: &Host,
    config: &Config,
    package_manager: &dyn PackageManager,
    opts: &RestoreOpts,
) -> Result<RestoreReport> {
    let bundle = &opts.bundle;
    let manifest = load_bundle(bundle)?;
    ui::info(&format!(
        "Loaded bundle: {} packages, {} config folders, made on {}",
        manifest.packages.len(),
        manifest.config_folders.len(),
        describe_origin(&manifest)
    ));

    let desktop = check_desktop(&manifest.desktop, &host.desktop);
    match &desktop {
        DesktopCheck::Match => {}
        DesktopCheck::Mismatch {
            bundle: made_for,
            host: current,
        } => {
            if opts.strict_desktop {
                anyhow::bail!(
                    "Bundle was made for desktop '{}' but this session is '{}'",
                    made_for,
                    current
                );
            }
            ui::warn(&format!(
                "Bundle was made for desktop '{}' but this session is '{}'",
                made_for, current
            ));
            ui::hint("Continuing anyway; some configs may not apply to this desktop");
        }
        DesktopCheck::Unknown => {
            ui::info("Unable to compare desktops; continuing");
        }
    }

    if opts.dry_run {
        ui::info("Dry run: nothing will be installed or written");
    }

    let mut outcomes = Outcomes::default();

    if !opts.skip_packages {
        install_packages(&manifest, package_manager, opts.dry_run, &mut outcomes);
    }

    if !opts.skip_configs {
        restore_config_folders(host, bundle, &manifest, opts.dry_run, &mut outcomes);
        restore_dotfiles(host, config, bundle, &manifest, opts.dry_run, &mut outcomes);
    }

    Ok(RestoreReport {
        manifest,
        desktop,
        outcomes,
    })
}

fn describe_origin(manifest: &Manifest) -> String {
    let system = if manifest.system.is_empty() {
        "unknown system"
    } else {
        manifest.system.as_str()
    };
    match &manifest.hostname {
        Some(host) => format!("{} ({})", host, system),
        None => system.to_string(),
    }
}

fn install_packages(
    manifest: &Manifest,
    package_manager: &dyn PackageManager,
    dry_run: bool,
    outcomes: &mut Outcomes,
) {
    if manifest.packages.is_empty() {
        return;
    }

    let available = package_manager.is_available();
    if !available {
        ui::warn(&format!(
            "{} was not found on this system; packages will not be installed",
            package_manager.name()
        ));
    }

    ui::section(&format!("Installing {} packages", manifest.packages.len()));

    for package in &manifest.packages {
        let outcome = |status| ItemOutcome {
            kind: ItemKind::Package,
            name: package.name.clone(),
            source: None,
            dest: None,
            status,
        };

        if let Err(e) = manifest::validate_package_name(&package.name) {
            ui::warn(&format!("Skipping {}", e));
            outcomes.push(outcome(Status::Skipped(e.to_string())));
            continue;
        }

        if dry_run {
            outcomes.push(outcome(Status::Planned(
                package_manager.describe_install(&package.name),
            )));
            continue;
        }

        if !available {
            outcomes.push(outcome(Status::Failed(format!(
                "{} not available",
                package_manager.name()
            ))));
            continue;
        }

        ui::info(&format!("Installing {} {}", package.name, package.version));
        match package_manager.install(&package.name) {
            Ok(()) => {
                ui::success(&format!("Installed {}", package.name));
                outcomes.push(outcome(Status::Installed));
            }
            Err(e) => {
                ui::error(&format!("Failed to install {}: {:#}", package.name, e));
                outcomes.push(outcome(Status::Failed(format!("{:#}", e))));
            }
        }
    }
}

fn restore_config_folders(
    host: &Host,
    bundle: &Path,
    manifest: &Manifest,
    dry_run: bool,
    outcomes: &mut Outcomes,
) {
    let bundle_config = bundle.join(BUNDLE_CONFIG_DIR);

    for folder in &manifest.config_folders {
        let src = bundle_config.join(folder);
        let dest = host.config_root.join(folder);
        let outcome = |status| ItemOutcome {
            kind: ItemKind::ConfigFolder,
            name: folder.clone(),
            source: Some(src.clone()),
            dest: Some(dest.clone()),
            status,
        };

        if let Err(e) = manifest::validate_folder_name(folder) {
            ui::warn(&format!("Skipping {}", e));
            outcomes.push(outcome(Status::Skipped(e.to_string())));
            continue;
        }

        if !src.is_dir() {
            ui::warn(&format!(
                "Config folder {} is listed in the manifest but missing from the bundle",
                folder
            ));
            outcomes.push(outcome(Status::Skipped("missing from bundle".to_string())));
            continue;
        }

        if dry_run {
            outcomes.push(outcome(Status::Planned(format!(
                "copy to {}",
                dest.display()
            ))));
            continue;
        }

        match copy::copy_tree(&src, &dest) {
            Ok(stats) => {
                ui::success(&format!("Copied {} → {}", src.display(), dest.display()));
                outcomes.push(outcome(Status::Copied(stats)));
            }
            Err(e) => {
                ui::error(&format!("Failed to copy {}: {:#}", folder, e));
                outcomes.push(outcome(Status::Failed(format!("{:#}", e))));
            }
        }
    }
}

/// The configured well-known dotfiles plus whatever the bundle recorded,
/// without duplicates.
pub fn restore_dotfile_set(config: &Config, manifest: &Manifest) -> Vec<String> {
    let mut set: Vec<String> = Vec::new();
    for entry in config.restore.dotfiles.iter().chain(&manifest.dotfiles) {
        if !set.contains(entry) {
            set.push(entry.clone());
        }
    }
    set
}

fn restore_dotfiles(
    host: &Host,
    config: &Config,
    bundle: &Path,
    manifest: &Manifest,
    dry_run: bool,
    outcomes: &mut Outcomes,
) {
    for dotfile in restore_dotfile_set(config, manifest) {
        if let Err(e) = manifest::validate_dotfile_path(&dotfile) {
            ui::warn(&format!("Skipping {}", e));
            outcomes.push(ItemOutcome {
                kind: ItemKind::Dotfile,
                name: dotfile.clone(),
                source: None,
                dest: None,
                status: Status::Skipped(e.to_string()),
            });
            continue;
        }

        let src = bundle.join(&dotfile);
        // Not every bundle carries every dotfile
        if fs::symlink_metadata(&src).is_err() {
            continue;
        }

        let dest = host.home.join(&dotfile);
        let outcome = |status| ItemOutcome {
            kind: ItemKind::Dotfile,
            name: dotfile.clone(),
            source: Some(src.clone()),
            dest: Some(dest.clone()),
            status,
        };

        if dry_run {
            outcomes.push(outcome(Status::Planned(format!(
                "copy to {}",
                dest.display()
            ))));
            continue;
        }

        match copy::copy_entry(&src, &dest) {
            Ok(stats) => {
                ui::success(&format!("Copied {} → {}", src.display(), dest.display()));
                outcomes.push(outcome(Status::Copied(stats)));
            }
            Err(e) => {
                ui::error(&format!("Failed to copy {}: {:#}", dotfile, e));
                outcomes.push(outcome(Status::Failed(format!("{:#}", e))));
            }
        }
    }
}
