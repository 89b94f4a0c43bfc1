//! Resolution of the image file path from a volume label candidate.
use crate::error::{CopyError, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of every image file written.
pub const IMAGE_EXTENSION: &str = "iso";

/// Prefix of the names generated for discs without a usable label.
pub const GENERATED_NAME_PREFIX: &str = "DiscCopier_";

/// Highest collision suffix tried before giving up.
pub const MAX_CLASH_SUFFIX: u32 = 9_999;

// Characters Windows refuses in file names, plus '!'. Control characters are
// rejected separately.
const ILLEGAL_CHARS: &[char] = &['"', '<', '>', '|', ':', '*', '?', '\\', '/', '!'];

const RESERVED_NAMES: &[&str] = &["PRN", "AUX", "CLOCK$", "NUL", "CON"];

/// Removes every character that cannot appear in a file name.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control() && !ILLEGAL_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Whether `name` is a reserved device name (`CON`, `NUL`, `COM1`, `lpt9`...),
/// in any letter case.
pub fn is_reserved_name(name: &str) -> bool {
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name)) {
        return true;
    }

    match name.as_bytes() {
        [a, b, c, digit] => {
            let prefix = [*a, *b, *c];
            digit.is_ascii_digit()
                && (prefix.eq_ignore_ascii_case(b"COM") || prefix.eq_ignore_ascii_case(b"LPT"))
        }
        _ => false,
    }
}

/// Name used when a disc has no usable label, e.g. `DiscCopier_20260114093005`.
pub fn generated_name(now: DateTime<Local>) -> String {
    format!("{GENERATED_NAME_PREFIX}{}", now.format("%Y%m%d%H%M%S"))
}

/// The image path for `base` with collision suffix `clash`; `0` means no
/// suffix, `n` appends ` (n)`.
pub fn candidate_path(dir: &Path, base: &str, clash: u32) -> PathBuf {
    let file_name = if clash == 0 {
        format!("{base}.{IMAGE_EXTENSION}")
    } else {
        format!("{base} ({clash}).{IMAGE_EXTENSION}")
    };
    dir.join(file_name)
}

/// Resolves a safe, unused image path in `dest_dir` for the label `candidate`.
///
/// See [`resolve_target_path_at`].
pub fn resolve_target_path(dest_dir: &Path, candidate: &str) -> Result<PathBuf> {
    resolve_target_path_at(dest_dir, candidate, Local::now())
}

/// Resolves a safe, unused image path in `dest_dir` for the label `candidate`,
/// using `now` for generated names.
///
/// Illegal characters are stripped from the label. An empty or reserved result
/// is replaced by [`generated_name`]. If `<name>.iso` already exists as a file
/// or directory, ` (1)`, ` (2)`, ... are tried in order and the first free one
/// wins. Existence is checked on every attempt and nothing is created.
///
/// # Errors
///
/// [`CopyError::TargetNameExhausted`] if every suffix up to
/// [`MAX_CLASH_SUFFIX`] is taken.
pub fn resolve_target_path_at(
    dest_dir: &Path,
    candidate: &str,
    now: DateTime<Local>,
) -> Result<PathBuf> {
    resolve_with_limit(dest_dir, candidate, now, MAX_CLASH_SUFFIX)
}

fn resolve_with_limit(
    dest_dir: &Path,
    candidate: &str,
    now: DateTime<Local>,
    max_clash: u32,
) -> Result<PathBuf> {
    let mut name = sanitize_file_name(candidate);
    if name.is_empty() || is_reserved_name(&name) {
        name = generated_name(now);
    }

    let dir = std::path::absolute(dest_dir).unwrap_or_else(|_| dest_dir.to_path_buf());

    for clash in 0..=max_clash {
        let path = candidate_path(&dir, &name, clash);
        if !path_taken(&path) {
            return Ok(path);
        }
    }

    Err(CopyError::TargetNameExhausted { dir, name })
}

fn path_taken(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}
