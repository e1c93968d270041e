use anyhow::{Context, Result};
use std::borrow::Cow;
use std::process::{Command, Stdio};

use super::{parse_package_list, PackageManager, PackageManagerKind};
use crate::manifest::Package;

/// Package manager driven through its command line.
#[derive(Debug, Clone)]
pub struct CommandPackageManager {
    kind: PackageManagerKind,
    use_sudo: bool,
}

impl CommandPackageManager {
    pub fn new(kind: PackageManagerKind, use_sudo: bool) -> Self {
        Self { kind, use_sudo }
    }

    fn binary(&self) -> &'static str {
        match self.kind {
            PackageManagerKind::Pacman => "pacman",
            PackageManagerKind::Paru => "paru",
        }
    }

    /// Program and arguments for installing `name`
    fn install_command(&self, name: &str) -> (String, Vec<String>) {
        // `--` ends option parsing so a name can't turn into a flag
        let mut args: Vec<String> = ["-S", "--needed", "--noconfirm", "--", name]
            .iter()
            .map(|s| s.to_string())
            .collect();

        match self.kind {
            // paru escalates on its own and refuses to run as root
            PackageManagerKind::Pacman if self.use_sudo => {
                args.insert(0, self.binary().to_string());
                ("sudo".to_string(), args)
            }
            _ => (self.binary().to_string(), args),
        }
    }
}

impl PackageManager for CommandPackageManager {
    fn name(&self) -> &str {
        self.binary()
    }

    fn is_available(&self) -> bool {
        which::which(self.binary()).is_ok()
    }

    fn list_installed(&self) -> Result<Vec<Package>> {
        let output = Command::new(self.binary())
            .arg("-Q")
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {} -Q", self.binary()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} -Q failed with exit code {:?}: {}",
                self.binary(),
                output.status.code(),
                stderr.trim()
            );
        }

        Ok(parse_package_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn install(&self, name: &str) -> Result<()> {
        let (program, args) = self.install_command(name);

        // Inherit the terminal so sudo can prompt and output streams live
        let status = Command::new(&program)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("Failed to run {}", program))?;

        if !status.success() {
            anyhow::bail!(
                "{} exited with code {:?}",
                self.describe_install(name),
                status.code()
            );
        }

        Ok(())
    }

    fn describe_install(&self, name: &str) -> String {
        let (program, args) = self.install_command(name);
        std::iter::once(program)
            .chain(args)
            .map(|part| shell_escape::escape(Cow::from(part)).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
