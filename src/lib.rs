//! padlink - resolve a desired gamepad into a live handle and keep it
//! resolved across hotplug.

pub mod config;
pub mod device;
