//! Recovery of trace files left in the test directory.
//!
//! A test that fails halfway may leave capture files in its working
//! directory instead of the output directory. They are moved into a
//! dedicated subdirectory of the output so the task still uploads them.

use std::path::{Path, PathBuf};

use crate::config::SalvageConfig;
use crate::error::Result;

/// Finds the salvageable files directly inside `dir`.
///
/// Matches files whose name ends in `.<extension>`, following symlinks like
/// a shell `*.ext` glob. Hidden files are skipped and subdirectories are not
/// searched.
/// The result is sorted by path.
pub fn find_artifacts(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let suffix = format!(".{}", extension);
    let mut found = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || !name.ends_with(&suffix) {
            continue;
        }
        // A dangling link has no metadata and nothing to salvage
        let is_file = std::fs::metadata(entry.path())
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if is_file {
            found.push(entry.path());
        }
    }

    found.sort();
    Ok(found)
}

/// Moves salvageable files from `test_dir` into `out_dir/<dir_name>`.
///
/// Returns the new paths. The salvage directory is created only when at
/// least one file matches.
pub fn salvage_artifacts(
    test_dir: &Path,
    out_dir: &Path,
    config: &SalvageConfig,
) -> Result<Vec<PathBuf>> {
    let artifacts = find_artifacts(test_dir, &config.extension)?;
    if artifacts.is_empty() {
        return Ok(Vec::new());
    }

    let salvage_dir = out_dir.join(&config.dir_name);
    std::fs::create_dir_all(&salvage_dir)?;

    let mut moved = Vec::with_capacity(artifacts.len());
    for source in artifacts {
        let Some(name) = source.file_name() else {
            continue;
        };
        let dest = salvage_dir.join(name);
        move_file(&source, &dest)?;
        tracing::info!(from = ?source, to = ?dest, "salvaged trace file");
        moved.push(dest);
    }

    Ok(moved)
}

/// Renames `source` to `dest`, copying when they are on different filesystems.
fn move_file(source: &Path, dest: &Path) -> Result<()> {
    match std::fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            std::fs::copy(source, dest)?;
            std::fs::remove_file(source)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
