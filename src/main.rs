use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use ricething::capture::{self, CaptureOpts};
use ricething::cfg::{self, Host};
use ricething::manifest::Manifest;
use ricething::packages::CommandPackageManager;
use ricething::restore::{self, RestoreOpts};
use ricething::ui;

/// ricething - clone, install and share your riced system
#[derive(Parser)]
#[command(name = "ricething")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Always print the full summary table
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file (defaults to ~/.ricething/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Build a rice bundle you can share and install later
    Build {
        /// Directory to write the bundle into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Don't bundle ~/.config folders
        #[arg(long)]
        skip_configs: bool,

        /// Don't record installed packages or the distribution
        #[arg(long)]
        skip_packages: bool,

        /// Extra dotfiles to bundle, relative to home (comma-separated)
        #[arg(short, long)]
        dotfiles: Option<String>,

        /// Also bundle the default shell and profile dotfiles
        #[arg(long)]
        default_dotfiles: bool,
    },

    /// Install a rice bundle from a directory
    Install {
        /// Bundle directory
        path: PathBuf,

        /// Don't install the bundle's packages
        #[arg(long)]
        skip_packages: bool,

        /// Don't copy config folders and dotfiles
        #[arg(long)]
        skip_configs: bool,

        /// Abort if the bundle was made on a different desktop
        #[arg(long)]
        strict_desktop: bool,

        /// Show what would be done without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show what a bundle contains
    Show {
        /// Bundle directory
        path: PathBuf,

        /// List every package
        #[arg(long)]
        packages: bool,
    },

    /// Edit or view configuration
    Config {
        /// Open config in editor
        #[arg(long)]
        edit: bool,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    ui::init();

    if let Err(e) = run(cli) {
        ui::error(&format!("Error: {:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => cfg::expand_path(&path),
        None => cfg::default_config_path()?,
    };

    match cli.command {
        Commands::Init { force } => cmd_init(&config_path, force),
        Commands::Build {
            output,
            skip_configs,
            skip_packages,
            dotfiles,
            default_dotfiles,
        } => {
            let opts = CaptureOpts {
                output: cfg::expand_path(&output),
                skip_configs,
                skip_packages,
                dotfiles: dotfiles
                    .as_deref()
                    .map(capture::parse_dotfile_list)
                    .unwrap_or_default(),
                default_dotfiles,
            };
            cmd_build(&config_path, &opts, cli.verbose)
        }
        Commands::Install {
            path,
            skip_packages,
            skip_configs,
            strict_desktop,
            dry_run,
        } => {
            let opts = RestoreOpts {
                bundle: cfg::expand_path(&path),
                skip_packages,
                skip_configs,
                strict_desktop,
                dry_run,
            };
            cmd_install(&config_path, opts, cli.verbose)
        }
        Commands::Show { path, packages } => cmd_show(&cfg::expand_path(&path), packages),
        Commands::Config { edit, show } => cmd_config(&config_path, edit, show),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    cfg::init(config_path, force)?;
    ui::success(&format!("Config written to {}", config_path.display()));
    ui::hint("Run 'ricething build -o <dir>' to bundle your rice");
    Ok(())
}

fn cmd_build(config_path: &Path, opts: &CaptureOpts, verbose: bool) -> Result<()> {
    let config = cfg::load(config_path)?;
    let host = Host::from_env()?;
    let package_manager =
        CommandPackageManager::new(config.general.package_manager, config.general.use_sudo);

    ui::info(&format!("Building rice bundle in {}", opts.output.display()));
    let report = capture::capture(&host, &config, &package_manager, opts)?;

    report.outcomes.print_summary(verbose);

    let failed = report.outcomes.failures().count();
    if failed == 0 {
        ui::success("Bundle complete!");
    } else {
        ui::warn(&format!("Bundle complete with {} failed items", failed));
        ui::hint("Re-run 'ricething build' after fixing the errors above to retry");
    }
    ui::hint(&format!(
        "Install it elsewhere with 'ricething install {}'",
        opts.output.display()
    ));
    Ok(())
}

fn cmd_install(config_path: &Path, mut opts: RestoreOpts, verbose: bool) -> Result<()> {
    let config = cfg::load(config_path)?;
    let host = Host::from_env()?;
    let package_manager =
        CommandPackageManager::new(config.general.package_manager, config.general.use_sudo);
    opts.strict_desktop |= config.restore.strict_desktop;

    ui::info(&format!("Installing rice from {}", opts.bundle.display()));
    let report = restore::restore(&host, &config, &package_manager, &opts)?;

    report.outcomes.print_summary(verbose);

    let failed = report.outcomes.failures().count();
    if opts.dry_run {
        ui::hint("Remove --dry-run to apply these changes");
    } else if failed == 0 {
        ui::success("Rice installed!");
    } else {
        ui::warn(&format!("Install finished with {} failed items", failed));
    }
    Ok(())
}

fn cmd_show(bundle: &Path, list_packages: bool) -> Result<()> {
    let manifest = restore::load_bundle(bundle)?;
    print_manifest(&manifest, list_packages);
    Ok(())
}

fn print_manifest(manifest: &Manifest, list_packages: bool) {
    let or_unknown = |s: &str| {
        if s.is_empty() {
            "unknown".dimmed().to_string()
        } else {
            s.to_string()
        }
    };

    ui::section("Bundle");
    println!("  system:   {}", or_unknown(&manifest.system));
    println!("  desktop:  {}", or_unknown(&manifest.desktop));
    println!("  shell:    {}", or_unknown(&manifest.shell));
    if let Some(host) = &manifest.hostname {
        println!("  host:     {}", host);
    }
    if let Some(created) = &manifest.created {
        println!("  created:  {}", created.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("  schema:   v{}", manifest.version);

    ui::section(&format!("Config folders ({})", manifest.config_folders.len()));
    for folder in &manifest.config_folders {
        println!("  {}", folder);
    }

    ui::section(&format!("Dotfiles ({})", manifest.dotfiles.len()));
    for dotfile in &manifest.dotfiles {
        println!("  {}", dotfile);
    }

    ui::section(&format!("Packages ({})", manifest.packages.len()));
    if list_packages {
        let rows = manifest
            .packages
            .iter()
            .map(|p| vec![p.name.clone(), p.version.clone()])
            .collect();
        ui::print_table(&["Name", "Version"], rows);
    } else if !manifest.packages.is_empty() {
        ui::hint("Use --packages to list them");
    }
}

fn cmd_config(config_path: &Path, edit: bool, show: bool) -> Result<()> {
    if edit {
        cfg::edit(config_path)?;
        ui::success("Configuration edited");
    } else if show {
        let config = cfg::load(config_path)?;
        println!("{}", toml::to_string_pretty(&config)?);
    } else {
        ui::hint("Use --edit to modify or --show to view the configuration");
    }

    Ok(())
}
