//! Utility functions for output file placement

use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Suffix of files that are still being written
pub const PARTIAL_SUFFIX: &str = ".part";

/// Path tried on the `attempt`-th collision: `name.csv`, `name (1).csv`, ...
pub fn collision_candidate(path: &Path, attempt: u32) -> Result<PathBuf> {
    if attempt == 0 {
        return Ok(path.to_path_buf());
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
        Error::Other(format!("cannot extract file stem from {}", path.display()))
    })?;
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let new_name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{} ({}).{}", stem, attempt, ext),
        None => format!("{} ({})", stem, attempt),
    };
    Ok(parent.join(new_name))
}

/// Create a partial file for `file_name` in `dir`
///
/// Every call gets its own file (`.name.csv.XXXXXX.part`), so sessions
/// exporting the same filters never write into each other's output. The
/// file is deleted when the returned [`TempPath`] is dropped.
pub fn create_partial(dir: &Path, file_name: &str) -> Result<(std::fs::File, TempPath)> {
    let named = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(PARTIAL_SUFFIX)
        .tempfile_in(dir)?;
    Ok(named.into_parts())
}

/// Move a finished partial file to `path`, handling collisions per `action`
///
/// For `Rename`, the first free name among `name.csv`, `name (1).csv`, ...
/// is claimed. For `Skip`, an existing file yields [`Error::FileCollision`].
/// Both never replace a file, even one created concurrently. `Overwrite`
/// replaces `path` atomically. On error the partial file is removed.
///
/// # Examples
///
/// ```
/// use temptrack_export::config::FileCollisionAction;
/// use temptrack_export::utils::{create_partial, persist_partial};
///
/// let dir = std::env::temp_dir();
/// let (_file, partial) = create_partial(&dir, "temperature_data_june.csv").unwrap();
/// let path = persist_partial(
///     partial,
///     &dir.join("temperature_data_june.csv"),
///     FileCollisionAction::Rename,
/// )
/// .unwrap();
/// // If the file existed, `path` is temperature_data_june (1).csv
/// ```
pub fn persist_partial(
    partial: TempPath,
    path: &Path,
    action: FileCollisionAction,
) -> Result<PathBuf> {
    match action {
        FileCollisionAction::Overwrite => {
            partial.persist(path).map_err(|e| Error::Io(e.error))?;
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Skip => match partial.persist_noclobber(path) {
            Ok(()) => Ok(path.to_path_buf()),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Err(Error::FileCollision {
                path: path.to_path_buf(),
            }),
            Err(e) => Err(Error::Io(e.error)),
        },
        FileCollisionAction::Rename => {
            let mut partial = partial;
            for attempt in 0..=MAX_RENAME_ATTEMPTS {
                let candidate = collision_candidate(path, attempt)?;
                match partial.persist_noclobber(&candidate) {
                    Ok(()) => return Ok(candidate),
                    Err(e) if e.error.kind() == ErrorKind::AlreadyExists => partial = e.path,
                    Err(e) => return Err(Error::Io(e.error)),
                }
            }

            Err(Error::FileCollision {
                path: path.to_path_buf(),
            })
        }
    }
}
