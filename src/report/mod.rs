//! Per-item outcomes collected by the build and install pipelines.

use colored::*;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::copy::CopyStats;
use crate::ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ItemKind {
    ConfigFolder,
    Dotfile,
    Package,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::ConfigFolder => write!(f, "config"),
            ItemKind::Dotfile => write!(f, "dotfile"),
            ItemKind::Package => write!(f, "package"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Copied(CopyStats),
    Installed,
    /// Dry run: what would have happened
    Planned(String),
    Skipped(String),
    Failed(String),
}

impl Status {
    fn label(&self) -> ColoredString {
        match self {
            Status::Copied(_) => "Copied".blue(),
            Status::Installed => "Installed".green(),
            Status::Planned(_) => "Planned".cyan(),
            Status::Skipped(_) => "Skipped".dimmed(),
            Status::Failed(_) => "Failed".red(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Status::Copied(_) => 0,
            Status::Installed => 1,
            Status::Planned(_) => 2,
            Status::Skipped(_) => 3,
            Status::Failed(_) => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub kind: ItemKind,
    pub name: String,
    pub source: Option<PathBuf>,
    pub dest: Option<PathBuf>,
    pub status: Status,
}

#[derive(Debug, Clone, Default)]
pub struct Outcomes {
    pub items: Vec<ItemOutcome>,
}

impl Outcomes {
    pub fn push(&mut self, outcome: ItemOutcome) {
        self.items.push(outcome);
    }

    pub fn of_kind(&self, kind: ItemKind) -> impl Iterator<Item = &ItemOutcome> {
        self.items.iter().filter(move |item| item.kind == kind)
    }

    pub fn find(&self, kind: ItemKind, name: &str) -> Option<&ItemOutcome> {
        self.of_kind(kind).find(|item| item.name == name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.items
            .iter()
            .filter(|item| matches!(item.status, Status::Failed(_)))
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Totals over everything that was copied
    pub fn copy_totals(&self) -> CopyStats {
        let mut totals = CopyStats::default();
        for item in &self.items {
            if let Status::Copied(stats) = item.status {
                totals.merge(stats);
            }
        }
        totals
    }

    /// Print counts per status, then a table of items. Long tables are only
    /// printed when `verbose` is set; failures are always listed.
    pub fn print_summary(&self, verbose: bool) {
        if self.items.is_empty() {
            return;
        }

        ui::section("Summary");

        let mut counts: BTreeMap<u8, (ColoredString, usize)> = BTreeMap::new();
        for item in &self.items {
            counts
                .entry(item.status.rank())
                .or_insert_with(|| (item.status.label(), 0))
                .1 += 1;
        }
        println!();
        for (label, count) in counts.values() {
            println!("{}: {}", label, count);
        }

        let totals = self.copy_totals();
        if totals.total_entries() > 0 {
            println!(
                "{} files written ({}), {} unchanged, {} symlinks",
                totals.files,
                ui::format_bytes(totals.bytes),
                totals.unchanged,
                totals.symlinks
            );
        }

        let rows: Vec<Vec<String>> = self
            .items
            .iter()
            .filter(|item| verbose || self.items.len() <= 20 || matches!(item.status, Status::Failed(_)))
            .map(table_row)
            .collect();

        if !rows.is_empty() {
            println!();
            ui::print_table(&["Status", "Kind", "Item", "Detail"], rows);
        }
    }
}

fn table_row(item: &ItemOutcome) -> Vec<String> {
    let detail = match &item.status {
        Status::Copied(stats) => {
            let arrow = "→".dimmed().to_string();
            let dest = item
                .dest
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_default();
            format!("{} {} ({})", arrow, dest, ui::format_bytes(stats.bytes))
        }
        Status::Installed => String::new(),
        Status::Planned(what) => what.clone(),
        Status::Skipped(reason) => format!("({})", reason).dimmed().to_string(),
        Status::Failed(reason) => reason.red().to_string(),
    };

    vec![
        item.status.label().to_string(),
        item.kind.to_string(),
        item.name.clone(),
        detail,
    ]
}
