//! Publishing finished pyramids.
//!
//! A built `<name>_toast/` directory is moved into the public directory,
//! replacing whatever was published under that name before. The replacement
//! is a rename swap so the destination is never left half-written:
//!
//! ```text
//! work/Foo_toast/                 ─rename→  public/.Foo_toast.staging/
//! public/Foo_toast/   (old)       ─rename→  public/.Foo_toast.previous/
//! public/.Foo_toast.staging/      ─rename→  public/Foo_toast/
//! public/.Foo_toast.previous/     ─remove
//! ```
//!
//! If the final rename fails the previous directory is put back. Failing to
//! remove the previous directory afterwards is only logged. When the work
//! and public directories live on different filesystems the first move falls
//! back to copy + remove.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Output directory not found: {0}")]
    NotFound(PathBuf),
    #[error("Cannot publish {0}: path has no directory name")]
    NoName(PathBuf),
}

fn sibling(public_dir: &Path, name: &str, tag: &str) -> PathBuf {
    public_dir.join(format!(".{name}.{tag}"))
}

/// Remove a file or directory if it exists.
fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Remove the swapped-out publish. The new one is already live, so a
/// failure here is logged and left for the next run to clear.
fn discard_previous(previous: &Path) -> bool {
    match remove_path(previous) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, path = %previous.display(), "failed to remove previous publish");
            false
        }
    }
}

/// Recursively copy `src` to `dst`.
pub fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Move a directory, copying across filesystems when rename cannot.
fn move_dir(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!(src = %src.display(), dst = %dst.display(), "copying across devices");
            copy_dir(src, dst)?;
            fs::remove_dir_all(src)
        }
        Err(e) => Err(e),
    }
}

/// Move `output_dir` into `public_dir`, replacing any earlier copy.
///
/// Returns the published path, `public_dir/<name of output_dir>`.
pub fn publish(output_dir: &Path, public_dir: &Path) -> Result<PathBuf, PublishError> {
    if !output_dir.is_dir() {
        return Err(PublishError::NotFound(output_dir.to_path_buf()));
    }
    let name = output_dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PublishError::NoName(output_dir.to_path_buf()))?;

    fs::create_dir_all(public_dir)?;
    let dest = public_dir.join(name);
    let staging = sibling(public_dir, name, "staging");
    let previous = sibling(public_dir, name, "previous");

    // Leftovers from an interrupted run
    remove_path(&staging)?;
    remove_path(&previous)?;

    move_dir(output_dir, &staging)?;

    let had_previous = fs::symlink_metadata(&dest).is_ok();
    if had_previous {
        fs::rename(&dest, &previous)?;
    }

    if let Err(e) = fs::rename(&staging, &dest) {
        if had_previous {
            if let Err(restore) = fs::rename(&previous, &dest) {
                tracing::warn!(error = %restore, path = %dest.display(), "failed to restore previous publish");
            }
        }
        return Err(e.into());
    }

    if had_previous {
        discard_previous(&previous);
    }
    tracing::info!(from = %output_dir.display(), to = %dest.display(), "published");
    Ok(dest)
}
