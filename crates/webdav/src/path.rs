//! Local-to-remote path translation.

use std::path::{Component, Path};

/// Marker subdirectory that identifies a cartridge root. Everything from
/// the cartridge directory (the marker's parent) onward forms the
/// remote-relative path.
pub const CARTRIDGE_MARKER: &str = "cartridge";

/// Translates a local filesystem path into a remote-relative path.
///
/// Finds the first `cartridge` marker segment and emits the cartridge
/// directory name plus everything from the marker onward, `/`-joined
/// regardless of the platform separator. Returns `None` when the path
/// carries no marker (such paths have no place in the remote layout).
pub fn to_remote_path(local: &Path) -> Option<String> {
    let segments: Vec<&str> = local
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();

    let marker = segments.iter().position(|s| *s == CARTRIDGE_MARKER)?;
    // The component before the marker is the cartridge directory itself.
    let start = marker.checked_sub(1)?;
    Some(segments[start..].join("/"))
}
