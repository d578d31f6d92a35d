//! Output file naming
//!
//! Files are named `<prefix>_<YYYYMMDD_HHMMSS>.<ext>`. Names are claimed with
//! an atomic create-new open; when a name from the same second already
//! exists a numeric suffix is added (`_1`, `_2`, ...).

use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Timestamp format used in output names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const MAX_SUFFIX: u32 = 10_000;

/// `<prefix>_<YYYYMMDD_HHMMSS>`
pub fn timestamped_stem(prefix: &str, timestamp: &DateTime<Local>) -> String {
    format!("{}_{}", prefix, timestamp.format(TIMESTAMP_FORMAT))
}

fn candidate(dir: &Path, stem: &str, suffix: u32, extension: &str) -> PathBuf {
    let name = if suffix == 0 {
        format!("{stem}.{extension}")
    } else {
        format!("{stem}_{suffix}.{extension}")
    };
    dir.join(name)
}

/// Claim a fresh output file in `dir`, creating the directory if needed.
///
/// Returns the path together with the newly created (empty) file.
pub fn create_unique_file(
    dir: &Path,
    prefix: &str,
    extension: &str,
    timestamp: &DateTime<Local>,
) -> io::Result<(PathBuf, File)> {
    std::fs::create_dir_all(dir)?;
    let stem = timestamped_stem(prefix, timestamp);

    for suffix in 0..MAX_SUFFIX {
        let path = candidate(dir, &stem, suffix, extension);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {stem}.{extension} in {}", dir.display()),
    ))
}

/// Reduce a client-supplied file name to a safe basename.
///
/// The name is NFKD-normalized and the remaining non-ASCII characters are
/// dropped (`vidéo` becomes `video`). Path separators become word breaks,
/// anything outside `[A-Za-z0-9_.-]` is removed, whitespace runs are joined
/// with `_`, and leading/trailing `.`/`_` are stripped. May return an empty
/// string.
pub fn secure_filename(name: &str) -> String {
    let spaced: String = name
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Extension after the last `.`, if any
pub fn extension_of(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || stem.is_empty() {
        return None;
    }
    Some(ext)
}
