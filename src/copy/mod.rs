//! Filesystem copy primitives shared by the build and install pipelines.
//!
//! Every function copies one top-level item and returns on the first I/O
//! error; callers decide whether that error is fatal. Symbolic links are
//! re-created as links and never followed, except when the root handed to
//! [`copy_tree`] is itself a link to a directory.

use anyhow::{Context, Result};
use blake3::Hasher;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;
use walkdir::WalkDir;

/// Counters accumulated while copying one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Regular files written
    pub files: usize,
    /// Regular files skipped because the destination already matched
    pub unchanged: usize,
    pub symlinks: usize,
    pub dirs: usize,
    /// Bytes written (unchanged files don't count)
    pub bytes: u64,
}

impl CopyStats {
    pub fn merge(&mut self, other: CopyStats) {
        self.files += other.files;
        self.unchanged += other.unchanged;
        self.symlinks += other.symlinks;
        self.dirs += other.dirs;
        self.bytes += other.bytes;
    }

    pub fn total_entries(&self) -> usize {
        self.files + self.unchanged + self.symlinks
    }
}

/// Copy whatever lives at `src` (file, directory or symlink) to `dest`.
///
/// The type of `src` is determined without following links.
pub fn copy_entry(src: &Path, dest: &Path) -> Result<CopyStats> {
    let metadata = fs::symlink_metadata(src)
        .with_context(|| format!("Failed to stat {}", src.display()))?;

    if metadata.file_type().is_symlink() {
        ensure_parent(dest)?;
        copy_symlink(src, dest)?;
        Ok(CopyStats {
            symlinks: 1,
            ..CopyStats::default()
        })
    } else if metadata.is_dir() {
        copy_tree(src, dest)
    } else {
        copy_file(src, dest)
    }
}

/// Copy the directory tree under `src` into `dest`, merging with whatever
/// `dest` already holds.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<CopyStats> {
    if !src.is_dir() {
        anyhow::bail!("Source is not a directory: {}", src.display());
    }

    let mut stats = CopyStats::default();
    prepare_dir(dest)?;
    stats.dirs += 1;

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", src.display()))?;
        let rel_path = entry.path().strip_prefix(src)?;
        let target = dest.join(rel_path);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            prepare_dir(&target)?;
            stats.dirs += 1;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
            stats.symlinks += 1;
        } else {
            stats.merge(write_file(entry.path(), &target)?);
        }
    }

    Ok(stats)
}

/// Copy a single regular file, creating the destination's parent
/// directories first.
pub fn copy_file(src: &Path, dest: &Path) -> Result<CopyStats> {
    ensure_parent(dest)?;
    write_file(src, dest)
}

fn write_file(src: &Path, dest: &Path) -> Result<CopyStats> {
    let dest_meta = fs::symlink_metadata(dest).ok();

    match dest_meta {
        Some(meta) if meta.file_type().is_symlink() => {
            // Don't write through a link into some other part of the tree
            fs::remove_file(dest)
                .with_context(|| format!("Failed to replace symlink {}", dest.display()))?;
        }
        Some(meta) if meta.is_file() => {
            if files_identical(src, dest)? {
                return Ok(CopyStats {
                    unchanged: 1,
                    ..CopyStats::default()
                });
            }
        }
        _ => {}
    }

    let bytes = fs::copy(src, dest)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dest.display()))?;

    // Preserve mtime (best effort)
    if let Ok(metadata) = fs::metadata(src) {
        let mtime = filetime::FileTime::from_last_modification_time(&metadata);
        let _ = filetime::set_file_mtime(dest, mtime);
    }

    Ok(CopyStats {
        files: 1,
        bytes,
        ..CopyStats::default()
    })
}

fn copy_symlink(src: &Path, dest: &Path) -> Result<()> {
    let target = fs::read_link(src)
        .with_context(|| format!("Failed to read symlink {}", src.display()))?;

    if let Ok(meta) = fs::symlink_metadata(dest) {
        if meta.is_dir() {
            fs::remove_dir_all(dest)
        } else {
            fs::remove_file(dest)
        }
        .with_context(|| format!("Failed to replace {}", dest.display()))?;
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(&target, dest).with_context(|| {
        format!("Failed to symlink {} -> {}", dest.display(), target.display())
    })?;

    #[cfg(not(unix))]
    anyhow::bail!(
        "Symlinks are not supported on this platform: {} -> {}",
        src.display(),
        target.display()
    );

    Ok(())
}

/// Make sure `dir` exists as a real directory, replacing a symlink if one
/// sits in its place.
fn prepare_dir(dir: &Path) -> Result<()> {
    if let Ok(meta) = fs::symlink_metadata(dir) {
        if meta.file_type().is_symlink() {
            fs::remove_file(dir)
                .with_context(|| format!("Failed to replace symlink {}", dir.display()))?;
        }
    }
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

fn files_identical(a: &Path, b: &Path) -> Result<bool> {
    let meta_a = fs::metadata(a).with_context(|| format!("Failed to stat {}", a.display()))?;
    let meta_b = fs::metadata(b).with_context(|| format!("Failed to stat {}", b.display()))?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    Ok(digest(a)? == digest(b)?)
}

fn digest(path: &Path) -> Result<blake3::Hash> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Hasher::new();
    let mut buffer = [0; 8192];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}
