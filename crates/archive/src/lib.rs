//! Zip archive builder.
//!
//! Produces the payload the transfer components ship: a zip of the files
//! under a root directory matching a glob-filtered set, entry names
//! relative to the root with an optional prefix.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Errors from archive building.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("bad glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Writes a zip of everything under `root` matching `includes` minus
/// `excludes` to `dest`.
///
/// Entry names are relative to `root`, `/`-separated, optionally prefixed
/// with `path_prefix`. An empty `includes` list means "everything".
pub fn compress(
    root: &Path,
    dest: &Path,
    includes: &[String],
    path_prefix: &str,
    excludes: &[String],
) -> Result<(), ArchiveError> {
    let includes = parse_patterns(includes)?;
    let excludes = parse_patterns(excludes)?;

    let file = File::create(dest)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        // Stable entry order keeps archives reproducible.
        entries.sort();

        for path in entries {
            // Never archive the archive being written.
            if path == dest {
                continue;
            }
            let rel = match path.strip_prefix(root) {
                Ok(rel) => rel_name(rel),
                Err(_) => continue,
            };

            if matches_any(&excludes, &rel) {
                continue;
            }

            if path.is_dir() {
                stack.push(path);
                continue;
            }

            if !includes.is_empty() && !matches_any(&includes, &rel) {
                continue;
            }

            let entry = if path_prefix.is_empty() {
                rel.clone()
            } else {
                format!("{}/{}", path_prefix.trim_end_matches('/'), rel)
            };

            zip.start_file(entry.as_str(), options)?;
            let mut src = File::open(&path)?;
            io::copy(&mut src, &mut zip)?;
            debug!(entry = %entry, "archived");
        }
    }

    let mut file = zip.finish()?;
    file.flush()?;
    Ok(())
}

fn parse_patterns(globs: &[String]) -> Result<Vec<Pattern>, glob::PatternError> {
    globs.iter().map(|g| Pattern::new(g)).collect()
}

fn matches_any(patterns: &[Pattern], rel: &str) -> bool {
    patterns.iter().any(|p| p.matches(rel))
}

/// Relative path as a `/`-separated entry name.
fn rel_name(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect::<Vec<_>>()
        .join("/")
}
