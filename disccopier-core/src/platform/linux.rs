use crate::drive::{Drive, DriveKind};
use crate::error::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Helper to read a specific file from the /sys/block filesystem.
fn read_sys_file(device_name: &str, file: &str) -> io::Result<String> {
    let path = PathBuf::from("/sys/block").join(device_name).join(file);
    fs::read_to_string(path).map(|s| s.trim().to_string())
}

/// Finds where a device is mounted, if anywhere.
fn mount_point_of(disks: &sysinfo::Disks, device_path: &Path) -> Option<PathBuf> {
    disks
        .iter()
        .find(|disk| Path::new(disk.name()) == device_path)
        .map(|disk| disk.mount_point().to_path_buf())
}

/// Scans for optical drives on a Linux system.
///
/// Optical drives are the SCSI CD-ROM devices (`/sys/block/sr*`). The size of
/// the inserted disc comes from `/sys/block/<device>/size`, in 512-byte
/// sectors; a size of zero means the drive is empty and not ready.
///
/// # Returns
///
/// The drives sorted by device name, or an error if `/sys/block` cannot be read.
pub fn list_optical_drives() -> Result<Vec<Drive>> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let mut drives = Vec::new();

    for entry in fs::read_dir("/sys/block")?.flatten() {
        let device_name = entry.file_name().to_string_lossy().to_string();
        if !device_name.starts_with("sr") {
            continue;
        }

        let device_path = PathBuf::from("/dev/").join(&device_name);

        let size_sectors = read_sys_file(&device_name, "size")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        let total_size = (size_sectors > 0).then_some(size_sectors * 512);

        drives.push(Drive {
            root: mount_point_of(&disks, &device_path).unwrap_or_default(),
            name: device_name,
            device_path,
            kind: DriveKind::Optical,
            total_size,
            label: None,
            ready: total_size.is_some(),
        });
    }

    drives.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(drives)
}

/// Scans for fixed, mounted disks on a Linux system.
///
/// Every non-removable disk `sysinfo` knows about is reported once per mount
/// point, sorted by mount point.
pub fn list_fixed_drives() -> Result<Vec<Drive>> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let mut drives: Vec<Drive> = disks
        .iter()
        .filter(|disk| !disk.is_removable())
        .map(|disk| Drive {
            name: disk.mount_point().to_string_lossy().to_string(),
            root: disk.mount_point().to_path_buf(),
            device_path: PathBuf::from(disk.name()),
            kind: DriveKind::Fixed,
            total_size: Some(disk.total_space()),
            label: None,
            ready: true,
        })
        .collect();

    drives.sort_by(|a, b| a.root.cmp(&b.root));
    Ok(drives)
}
