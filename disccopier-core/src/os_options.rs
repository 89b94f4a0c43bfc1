use std::fs::OpenOptions;

#[cfg(windows)]
use std::os::windows::fs::OpenOptionsExt;
#[cfg(windows)]
use windows_sys::Win32::Storage::FileSystem::{FILE_SHARE_READ, FILE_SHARE_WRITE};

/// Builds the open options for a raw optical device.
///
/// The device is always opened for reading. `writable` adds write access,
/// which some drivers require before they accept a speed control request.
/// On Windows the handle is shared for both reading and writing so the OS
/// and other readers keep access to the drive while the copy runs.
pub(crate) fn device_open_options(writable: bool) -> OpenOptions {
    let mut options = OpenOptions::new();
    options.read(true).write(writable);

    #[cfg(windows)]
    options.share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE);

    options
}
