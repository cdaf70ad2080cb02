//! Filesystem operations used by the staging stages.
//!
//! Each operation returns a typed result carrying the offending path, so a
//! failed copy in the middle of staging is reported precisely. None of them
//! is transactional.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{BuildError, IoContext, Result};

/// Create `dir` and its parents if needed
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).at_path(dir)
}

/// Remove whatever is at `path` (symlink, file or directory tree) without
/// following symlinks. Returns false if nothing was there.
pub fn remove_path(path: &Path) -> Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(BuildError::io(path, e)),
    };

    if metadata.is_dir() {
        fs::remove_dir_all(path).at_path(path)?;
    } else {
        fs::remove_file(path).at_path(path)?;
    }
    Ok(true)
}

/// Remove every entry inside `dir`, keeping `dir` itself. A missing `dir` is fine.
pub fn clear_dir_contents(dir: &Path) -> Result<usize> {
    clear_dir_except(dir, &[])
}

/// Remove every entry inside `dir` except the paths in `keep` and the
/// directories leading to them.
pub fn clear_dir_except(dir: &Path, keep: &[PathBuf]) -> Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(BuildError::io(dir, e)),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry.at_path(dir)?.path();
        if keep.iter().any(|kept| kept == &path) {
            continue;
        }
        if keep.iter().any(|kept| kept.starts_with(&path)) {
            removed += clear_dir_except(&path, keep)?;
            continue;
        }
        remove_path(&path)?;
        removed += 1;
    }
    Ok(removed)
}

/// Recursively copy the contents of `src` into `dst`, hidden entries
/// included. Directories are created before their children (self-first);
/// existing files are overwritten; symlinks are recreated, not followed.
/// Returns the number of files and links copied.
pub fn copy_dir_contents(src: &Path, dst: &Path) -> Result<usize> {
    ensure_dir(dst)?;

    let mut copied = 0;
    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            BuildError::io(path, io::Error::from(e))
        })?;

        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| BuildError::io(entry.path(), io::Error::other("entry outside source tree")))?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            ensure_dir(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).at_path(entry.path())?;
            remove_path(&target)?;
            std::os::unix::fs::symlink(&link, &target).at_path(&target)?;
            copied += 1;
        } else {
            if fs::symlink_metadata(&target).is_ok_and(|m| m.file_type().is_symlink()) {
                remove_path(&target)?;
            }
            fs::copy(entry.path(), &target).at_path(&target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Move a writable directory's contents into its holding-area counterpart
/// and leave it empty:
///
/// 1. create `holding`
/// 2. ensure `live` exists
/// 3. copy everything in `live` (dotfiles too) into `holding`
/// 4. delete `live`
/// 5. recreate `live` empty
pub fn stage_directory(live: &Path, holding: &Path) -> Result<usize> {
    ensure_dir(holding)?;
    ensure_dir(live)?;
    let copied = copy_dir_contents(live, holding)?;
    remove_path(live)?;
    fs::create_dir(live).at_path(live)?;
    Ok(copied)
}
