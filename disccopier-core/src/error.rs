//! Error types for the copy engine and its collaborators.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`CopyError`].
pub type Result<T> = std::result::Result<T, CopyError>;

/// Errors that can abort a disc copy.
///
/// None of these are retried internally; every one of them ends the current
/// transfer.
#[derive(Error, Debug)]
pub enum CopyError {
    /// The device path is invalid or the device cannot be opened.
    #[error("Unable to open device {}: {source}", .path.display())]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The drive rejected the speed control request.
    #[error("Unable to set drive speed to {read_kbps}/{write_kbps} KB/s: {source}")]
    DeviceSpeedNegotiation {
        read_kbps: u16,
        write_kbps: u16,
        #[source]
        source: io::Error,
    },

    /// A read from the device failed mid-transfer.
    #[error("Device read failed after {offset} bytes (os error {}): {source}", os_code_display(.code))]
    DeviceRead {
        offset: u64,
        code: Option<i32>,
        #[source]
        source: io::Error,
    },

    /// The image file could not be created.
    #[error("Unable to create image file {}: {source}", .path.display())]
    SinkCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing to or flushing the image file failed.
    #[error("Unable to write image file {}: {source}", .path.display())]
    SinkWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Every collision suffix for the target name is already taken.
    #[error("No free image file name for '{name}' in {}", .dir.display())]
    TargetNameExhausted { dir: PathBuf, name: String },

    /// The copy options cannot drive a transfer.
    #[error("Invalid copy options: {0}")]
    InvalidOptions(&'static str),

    /// The drives attached to the system could not be enumerated.
    #[error("Unable to enumerate drives: {0}")]
    Discovery(#[from] io::Error),
}

fn os_code_display(code: &Option<i32>) -> String {
    code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

impl CopyError {
    /// Wraps a failed device read, keeping the OS error code.
    pub fn device_read(offset: u64, source: io::Error) -> Self {
        CopyError::DeviceRead {
            offset,
            code: source.raw_os_error(),
            source,
        }
    }

    /// Returns `true` if this error left no image file behind.
    pub fn is_before_output(&self) -> bool {
        matches!(
            self,
            CopyError::DeviceOpen { .. }
                | CopyError::DeviceSpeedNegotiation { .. }
                | CopyError::SinkCreate { .. }
                | CopyError::TargetNameExhausted { .. }
                | CopyError::InvalidOptions(_)
                | CopyError::Discovery(_)
        )
    }
}
