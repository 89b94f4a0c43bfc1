//! Provides platform-specific drive discovery.
//!
//! This module contains the logic for asking the operating system which
//! optical and fixed drives are attached, together with the size and state
//! the OS reports for them.
//!
//! It uses conditional compilation (`#[cfg]`) to expose the correct implementation
//! for the target OS (e.g., Linux, Windows). Each submodule exposes the same
//! public API: `list_optical_drives()` and `list_fixed_drives()`, both returning
//! drives in a stable order. Picking a default drive is left to the caller.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use self::linux::*;

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
pub use self::windows::*;
