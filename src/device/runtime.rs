//! Hardware runtime seam
//!
//! Everything that actually touches devices goes through [`HardwareRuntime`].
//! The engine never enumerates, opens or rumbles on its own.

use std::fmt;

use super::descriptor::Descriptor;

/// Opaque handle returned by a runtime for an opened device
///
/// Only the low 62 bits are usable so a handle can be packed together with
/// its kind into one atomic word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawHandle(u64);

impl RawHandle {
    pub const MAX: u64 = (1 << 62) - 1;

    pub fn new(value: u64) -> Option<Self> {
        (value <= Self::MAX).then_some(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Whether a device was opened through the controller or the joystick API
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Joystick,
    Controller,
}

/// Asynchronous notification from the runtime's own event source
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HotplugEvent {
    Added { candidate: Descriptor, index: i32 },
    Removed { index: i32 },
}

/// Device access consumed by the engine
///
/// Implementations are shared between the caller, scanner and hotplug
/// threads, hence `Send + Sync`. Close calls are best effort: a device that
/// is already gone may fail to close and nobody checks.
pub trait HardwareRuntime: Send + Sync {
    /// Lists the devices attached right now, in enumeration order
    fn enumerate_devices(&self) -> Vec<Descriptor>;

    fn is_controller(&self, index: i32) -> bool;

    fn open_joystick(&self, index: i32) -> Option<RawHandle>;

    fn open_controller(&self, index: i32) -> Option<RawHandle>;

    fn close_joystick(&self, handle: RawHandle);

    fn close_controller(&self, handle: RawHandle);

    fn rumble_joystick(&self, handle: RawHandle, strong: u16, weak: u16, duration_ms: u32)
        -> bool;

    fn rumble_controller(
        &self,
        handle: RawHandle,
        strong: u16,
        weak: u16,
        duration_ms: u32,
    ) -> bool;

    /// Classifies the device at `index` and opens it with the matching API
    fn open(&self, index: i32) -> Option<(HandleKind, RawHandle)> {
        if self.is_controller(index) {
            self.open_controller(index)
                .map(|handle| (HandleKind::Controller, handle))
        } else {
            self.open_joystick(index)
                .map(|handle| (HandleKind::Joystick, handle))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_handle_rejects_values_above_payload() {
        assert_eq!(RawHandle::new(RawHandle::MAX).map(RawHandle::get), Some(RawHandle::MAX));
        assert!(RawHandle::new(RawHandle::MAX + 1).is_none());
        assert!(RawHandle::new(u64::MAX).is_none());
    }
}
