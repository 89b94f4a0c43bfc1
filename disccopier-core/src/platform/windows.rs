use crate::drive::{Drive, DriveKind, device_path_for_letter};
use crate::error::Result;
use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::path::PathBuf;
use std::ptr;
use windows_sys::Win32::Storage::FileSystem::{
    GetDiskFreeSpaceExW, GetDriveTypeW, GetLogicalDrives, GetVolumeInformationW,
};

// Return values of `GetDriveTypeW`.
const DRIVE_FIXED: u32 = 3;
const DRIVE_CDROM: u32 = 5;

fn to_wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

/// Returns the volume label, or `None` if the volume cannot be queried
/// (for an optical drive: no disc inserted).
fn volume_label(root: &[u16]) -> Option<String> {
    let mut name = vec![0u16; 261];

    // SAFETY: `root` is NUL-terminated and `name` is a live buffer of the
    // length passed in. Unused out-parameters are null.
    let ok = unsafe {
        GetVolumeInformationW(
            root.as_ptr(),
            name.as_mut_ptr(),
            name.len() as u32,
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
            0,
        )
    };
    if ok == 0 {
        return None;
    }

    Some(
        String::from_utf16_lossy(&name)
            .trim_end_matches('\0')
            .to_string(),
    )
}

fn total_size(root: &[u16]) -> Option<u64> {
    let mut total: u64 = 0;

    // SAFETY: `root` is NUL-terminated and `total` outlives the call.
    let ok = unsafe { GetDiskFreeSpaceExW(root.as_ptr(), ptr::null_mut(), &mut total, ptr::null_mut()) };
    (ok != 0).then_some(total)
}

/// Lists the lettered drives of one `GetDriveTypeW` type, in letter order.
fn list_drives(kind: DriveKind, drive_type: u32) -> Result<Vec<Drive>> {
    // SAFETY: no arguments; returns a bitmask of the logical drives.
    let mask = unsafe { GetLogicalDrives() };
    if mask == 0 {
        return Err(io::Error::last_os_error().into());
    }

    let mut drives = Vec::new();
    for (bit, letter) in ('A'..='Z').enumerate() {
        if mask & (1 << bit) == 0 {
            continue;
        }

        let root = format!("{letter}:\\");
        let root_wide = to_wide(&root);

        // SAFETY: `root_wide` is NUL-terminated.
        if unsafe { GetDriveTypeW(root_wide.as_ptr()) } != drive_type {
            continue;
        }

        let label = volume_label(&root_wide);
        let ready = label.is_some();

        drives.push(Drive {
            name: format!("{letter}:"),
            root: PathBuf::from(root),
            device_path: device_path_for_letter(letter),
            kind,
            total_size: if ready { total_size(&root_wide) } else { None },
            label: label.filter(|l| !l.is_empty()),
            ready,
        });
    }

    Ok(drives)
}

/// Scans for optical (CD-ROM class) drives on a Windows system.
///
/// # Returns
///
/// The drives in drive-letter order. A drive without a disc is listed with
/// `ready == false` and no size.
pub fn list_optical_drives() -> Result<Vec<Drive>> {
    list_drives(DriveKind::Optical, DRIVE_CDROM)
}

/// Scans for fixed drives on a Windows system, in drive-letter order.
pub fn list_fixed_drives() -> Result<Vec<Drive>> {
    list_drives(DriveKind::Fixed, DRIVE_FIXED)
}
