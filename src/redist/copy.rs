//! Filesystem helpers used while assembling the redist tree.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Source-control metadata directory left behind by checkouts.
pub const SVN_DIR: &str = ".svn";

/// Copy `src` into `dst` recursively, skipping `.svn` directories. Returns
/// the files written, relative paths included.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    copy_dir_into(src, dst, &mut written)?;
    Ok(written)
}

fn copy_dir_into(src: &Path, dst: &Path, written: &mut Vec<PathBuf>) -> Result<()> {
    fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create directory: {}", dst.display()))?;

    let mut entries = fs::read_dir(src)
        .with_context(|| format!("Failed to read directory: {}", src.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to read directory: {}", src.display()))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        if entry.file_name() == SVN_DIR {
            continue;
        }
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copy_dir_into(&src_path, &dst_path, written)?;
        } else {
            fs::copy(&src_path, &dst_path)
                .with_context(|| format!("Failed to copy file: {}", src_path.display()))?;
            written.push(dst_path);
        }
    }

    Ok(())
}

/// Files matching `pattern` (a glob relative to `base`), sorted.
pub fn glob_files(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = base.join(pattern);
    let full = full
        .to_str()
        .with_context(|| format!("non UTF-8 path '{}'", full.display()))?;

    let mut matches = Vec::new();
    for entry in glob::glob(full).with_context(|| format!("invalid pattern '{}'", pattern))? {
        let path = entry.with_context(|| format!("expanding pattern '{}'", pattern))?;
        if path.is_file() {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches)
}

/// Directories matching `pattern` relative to `base`, sorted.
pub fn glob_dirs(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = base.join(pattern);
    let full = full
        .to_str()
        .with_context(|| format!("non UTF-8 path '{}'", full.display()))?;

    let mut matches = Vec::new();
    for entry in glob::glob(full).with_context(|| format!("invalid pattern '{}'", pattern))? {
        let path = entry.with_context(|| format!("expanding pattern '{}'", pattern))?;
        if path.is_dir() && path.file_name().is_some_and(|n| n != SVN_DIR) {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches)
}

/// Make every file below `root` writable.
pub fn clear_readonly(root: &Path) -> Result<usize> {
    let mut cleared = 0;
    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("walking '{}'", root.display()))?;
        let meta = entry
            .metadata()
            .with_context(|| format!("reading metadata of '{}'", entry.path().display()))?;
        let mut perms = meta.permissions();
        if perms.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            fs::set_permissions(entry.path(), perms).with_context(|| {
                format!("clearing read-only flag on '{}'", entry.path().display())
            })?;
            cleared += 1;
        }
    }
    Ok(cleared)
}

/// Delete every `.svn` directory below `root`.
pub fn remove_svn_dirs(root: &Path) -> Result<usize> {
    let mut found = Vec::new();
    let mut walker = WalkDir::new(root).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.with_context(|| format!("walking '{}'", root.display()))?;
        if entry.file_type().is_dir() && entry.file_name() == SVN_DIR {
            found.push(entry.into_path());
            walker.skip_current_dir();
        }
    }
    for dir in &found {
        fs::remove_dir_all(dir).with_context(|| format!("removing '{}'", dir.display()))?;
    }
    Ok(found.len())
}

/// Delete files in `dir` whose names match `pattern`.
pub fn remove_matching(dir: &Path, pattern: &str) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let files = glob_files(dir, pattern)?;
    for file in &files {
        fs::remove_file(file).with_context(|| format!("removing '{}'", file.display()))?;
    }
    Ok(files.len())
}

/// Copy a single file, creating the destination directory.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_file() {
        bail!("Missing artifact '{}'", src.display());
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::copy(src, dst).with_context(|| {
        format!(
            "Failed to copy file: {} -> {}",
            src.display(),
            dst.display()
        )
    })?;
    Ok(())
}
