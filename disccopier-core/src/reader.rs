//! Raw, sequential read access to an optical disc device.
//!
//! A [`RawDeviceReader`] owns the OS handle of the opened device and exposes
//! it through [`std::io::Read`] only: raw device streams have no reliable
//! length and no seek support, so the total size of a disc has to come from
//! drive metadata (see [`crate::drive::Drive::total_size`]).
use crate::error::{CopyError, Result};
use crate::os_options::device_open_options;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read speed of an 8x DVD drive, in KB/s.
pub const DVD_8X_KBPS: u16 = 11_080;

/// Read speed of a 1x CD drive, in KB/s.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
const CD_1X_KBPS: u16 = 176;

/// A drive speed to request right after the device is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpeedRequest {
    pub read_kbps: u16,
    pub write_kbps: u16,
}

impl SpeedRequest {
    /// Requests the same speed in both directions.
    pub fn symmetric(kbps: u16) -> Self {
        Self {
            read_kbps: kbps,
            write_kbps: kbps,
        }
    }
}

impl Default for SpeedRequest {
    fn default() -> Self {
        Self::symmetric(DVD_8X_KBPS)
    }
}

/// Composes a Windows device I/O control code.
pub const fn ctl_code(device_type: u32, function: u32, method: u32, access: u32) -> u32 {
    (device_type << 16) | (access << 14) | (function << 2) | method
}

const FILE_DEVICE_CD_ROM: u32 = 0x0000_0002;
const CDROM_SET_SPEED_FUNCTION: u32 = 0x0018;
const METHOD_BUFFERED: u32 = 0;
const FILE_READ_ACCESS: u32 = 0x0001;

/// `IOCTL_CDROM_SET_SPEED`.
pub const IOCTL_CDROM_SET_SPEED: u32 = ctl_code(
    FILE_DEVICE_CD_ROM,
    CDROM_SET_SPEED_FUNCTION,
    METHOD_BUFFERED,
    FILE_READ_ACCESS,
);

/// Payload of `IOCTL_CDROM_SET_SPEED` (`CDROM_SET_SPEED`).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[cfg_attr(not(windows), allow(dead_code))]
struct CdromSetSpeed {
    /// `CdromSetSpeed` = 0.
    request_type: u32,
    read_speed: u16,
    write_speed: u16,
    /// `CdromDefaultRotation` = 0.
    rotation_control: u32,
}

#[cfg_attr(not(windows), allow(dead_code))]
impl CdromSetSpeed {
    fn new(speed: SpeedRequest) -> Self {
        Self {
            request_type: 0,
            read_speed: speed.read_kbps,
            write_speed: speed.write_kbps,
            rotation_control: 0,
        }
    }
}

/// An opened raw optical device.
///
/// The handle is released exactly once, either by [`RawDeviceReader::close`]
/// or when the reader is dropped. A reader is meant for one sequential caller
/// and is not shared across threads.
#[derive(Debug)]
pub struct RawDeviceReader {
    file: File,
    path: PathBuf,
}

impl RawDeviceReader {
    /// Opens `path` for sequential raw reads.
    ///
    /// When `speed` is given, the device is opened read/write and the drive is
    /// asked to run at that speed before any data is read. A rejected speed
    /// request fails the open.
    ///
    /// # Errors
    ///
    /// - [`CopyError::DeviceOpen`] if the device cannot be opened.
    /// - [`CopyError::DeviceSpeedNegotiation`] if the drive rejects the speed.
    pub fn open(path: &Path, speed: Option<SpeedRequest>) -> Result<Self> {
        let file = device_open_options(speed.is_some())
            .open(path)
            .map_err(|source| CopyError::DeviceOpen {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(device = %path.display(), "opened raw device");

        let reader = Self {
            file,
            path: path.to_path_buf(),
        };

        if let Some(speed) = speed {
            set_speed(&reader.file, speed).map_err(|source| {
                CopyError::DeviceSpeedNegotiation {
                    read_kbps: speed.read_kbps,
                    write_kbps: speed.write_kbps,
                    source,
                }
            })?;
            debug!(
                read_kbps = speed.read_kbps,
                write_kbps = speed.write_kbps,
                "drive speed set"
            );
        }

        Ok(reader)
    }

    /// The device path this reader was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the device handle.
    pub fn close(self) {
        drop(self);
    }
}

impl Read for RawDeviceReader {
    /// Issues one raw read of up to `buf.len()` bytes. `Ok(0)` marks the end
    /// of the medium. On error the content of `buf` is unspecified.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Drop for RawDeviceReader {
    fn drop(&mut self) {
        debug!(device = %self.path.display(), "closed raw device");
    }
}

#[cfg(windows)]
fn set_speed(file: &File, speed: SpeedRequest) -> io::Result<()> {
    use std::ffi::c_void;
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::System::IO::DeviceIoControl;

    let payload = CdromSetSpeed::new(speed);
    let mut returned: u32 = 0;

    // SAFETY: the handle is owned by `file` and stays open for the call; the
    // input buffer points at a live `#[repr(C)]` value of the given size.
    let ok = unsafe {
        DeviceIoControl(
            file.as_raw_handle() as _,
            IOCTL_CDROM_SET_SPEED,
            &payload as *const CdromSetSpeed as *const c_void,
            std::mem::size_of::<CdromSetSpeed>() as u32,
            std::ptr::null_mut(),
            0,
            &mut returned,
            std::ptr::null_mut(),
        )
    };

    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(target_os = "linux")]
mod cdrom {
    // CDROM_SELECT_SPEED from <linux/cdrom.h>.
    nix::ioctl_write_int_bad!(cdrom_select_speed, 0x5322);
}

#[cfg(target_os = "linux")]
fn set_speed(file: &File, speed: SpeedRequest) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    // The Linux CD-ROM layer takes a speed factor relative to 1x CD.
    let factor = speed.read_kbps.div_ceil(CD_1X_KBPS).max(1);

    // SAFETY: the descriptor is owned by `file` and stays open for the call.
    unsafe { cdrom::cdrom_select_speed(file.as_raw_fd(), i32::from(factor)) }
        .map_err(io::Error::from)?;
    Ok(())
}

#[cfg(not(any(windows, target_os = "linux")))]
fn set_speed(_file: &File, _speed: SpeedRequest) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "drive speed control is not supported on this platform",
    ))
}
