//! The core, UI-agnostic library for the `disccopier` optical disc backup utility.
//!
//! `disccopier-core` streams the raw contents of an optical disc into a single
//! ISO image file, naming the file after the disc's volume label. It is meant
//! to be driven by a front-end (like the `disccopier` CLI) that picks the drive
//! and destination directory and renders progress however it likes.
//!
//! The library is structured into several key modules:
//! - [`drive`]: Contains the cross-platform `Drive` struct.
//! - [`platform`]: Provides platform-specific discovery of optical and fixed drives.
//! - [`reader`]: Raw sequential reads from a disc device, with optional speed control.
//! - [`label`]: Extraction of the ISO-9660 volume label from the first block.
//! - [`target`]: Turning a label into a safe, collision-free image file path.
//! - [`progress`]: Rolling throughput and ETA estimation.
//! - [`mod@copy`]: The streaming copy engine tying the above together.
//!
//! The primary entry point is [`copy::run`]. It reports progress through a
//! callback, and on failure returns the byte counts reached alongside the error.
//!
//! ## Example: Copying the First Optical Drive
//!
//! ```rust,no_run
//! use disccopier_core::{copy, platform};
//! use disccopier_core::copy::{CopyEvent, CopyOptions};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let drives = platform::list_optical_drives()?;
//!     let drive = drives.iter().find(|d| d.ready).ok_or("No disc inserted.")?;
//!
//!     let report = copy::run(drive, Path::new("D:\\"), &CopyOptions::default(), |event| {
//!         if let CopyEvent::Progress(snapshot) = event {
//!             println!("{snapshot}");
//!         }
//!     })?;
//!
//!     println!("Wrote {} bytes to {:?}", report.bytes_written, report.target);
//!     Ok(())
//! }
//! ```

pub mod copy;
pub mod drive;
pub mod error;
pub mod label;
mod os_options;
pub mod platform;
pub mod progress;
pub mod reader;
pub mod target;

pub use error::{CopyError, Result};
