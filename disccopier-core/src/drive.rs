use std::fmt;
use std::path::PathBuf;

/// What kind of drive a [`Drive`] is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriveKind {
    /// A CD/DVD/BD drive, the source of a copy.
    Optical,
    /// A fixed disk, a candidate destination.
    Fixed,
}

/// Represents a drive discovered on the system.
///
/// This struct holds cross-platform information about a drive, such as its
/// raw device path, its root directory and the size reported by the OS. It is
/// populated by the platform-specific discovery functions in the
/// [`crate::platform`] module.
#[derive(Clone, Debug)]
pub struct Drive {
    /// Short name of the drive (e.g., `D:` or `sr0`).
    pub name: String,
    /// The root directory of the drive's filesystem, if mounted.
    pub root: PathBuf,
    /// The raw device path (e.g., `\\.\D:` or `/dev/sr0`).
    pub device_path: PathBuf,
    pub kind: DriveKind,
    /// Total size in bytes, as reported by drive metadata. `None` when the
    /// OS does not know (no medium, or an unmounted disc).
    pub total_size: Option<u64>,
    /// The volume label reported by the OS, if any.
    pub label: Option<String>,
    /// Whether a medium is present and readable.
    pub ready: bool,
}

/// Returns the raw device path for a drive letter, `\\.\<letter>:`.
pub fn device_path_for_letter(letter: char) -> PathBuf {
    PathBuf::from(format!(r"\\.\{}:", letter.to_ascii_uppercase()))
}

impl Drive {
    /// Whether this drive answers to `choice`, compared on the first character
    /// only and case-insensitively. An empty choice matches every drive.
    pub fn matches_choice(&self, choice: &str) -> bool {
        match choice.chars().next() {
            None => true,
            Some(c) => self
                .name
                .chars()
                .next()
                .is_some_and(|n| n.eq_ignore_ascii_case(&c)),
        }
    }
}

impl fmt::Display for Drive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = match self.total_size {
            Some(bytes) => format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0)),
            None => "-".to_string(),
        };
        let state = if self.ready { "ready" } else { "not ready" };

        write!(
            f,
            "{:<10} {:<15} {:>10}  {:<9} {}",
            self.name,
            self.device_path.display(),
            size,
            state,
            self.label.as_deref().unwrap_or("")
        )
    }
}
