use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::error::FfxError;
use crate::core::transcode::timestamp_millis;

const LIBRARY_SUBDIR: &str = "FFmpeg";
const PENDING_SUFFIX: &str = "pending";

/// `$XDG_VIDEOS_DIR` (or the platform equivalent), falling back to `~/Videos`.
pub fn default_library_dir() -> Option<PathBuf> {
    dirs::video_dir().or_else(|| dirs::home_dir().map(|home| home.join("Videos")))
}

/// Copy `source` into `<library>/FFmpeg/FFmpeg_<millis>.<ext>`.
///
/// The copy is written under a `.pending` name and renamed into place once
/// complete, so a half-written file never shows up under the final name.
pub fn export_to_library(source: &Path, library: &Path) -> Result<PathBuf, FfxError> {
    if !source.is_file() {
        return Err(FfxError::InvalidCommand {
            message: format!("nothing to export at {}", source.display()),
        });
    }

    let target_dir = library.join(LIBRARY_SUBDIR);
    fs::create_dir_all(&target_dir)?;

    let extension = source
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("mp4");
    let target = unique_target(&target_dir, &format!("FFmpeg_{}", timestamp_millis()), extension);
    let pending = target.with_extension(format!("{extension}.{PENDING_SUFFIX}"));

    if let Err(err) = fs::copy(source, &pending).and_then(|_| fs::rename(&pending, &target)) {
        if let Err(cleanup) = fs::remove_file(&pending) {
            warn!(%cleanup, pending = %pending.display(), "failed to remove pending export");
        }
        return Err(err.into());
    }

    info!(source = %source.display(), target = %target.display(), "exported to library");
    Ok(target)
}

/// `<dir>/<stem>.<ext>`, or `<stem>_<n>.<ext>` when that name is taken.
fn unique_target(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let mut target = dir.join(format!("{stem}.{extension}"));
    let mut n = 1;
    while target.exists() {
        target = dir.join(format!("{stem}_{n}.{extension}"));
        n += 1;
    }
    target
}
