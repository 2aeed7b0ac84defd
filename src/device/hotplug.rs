//! Hotplug handling
//!
//! Add and remove notifications arrive on the runtime's own event source,
//! independent of any scan. An explicit scan always wins: an add is ignored
//! while a device is open or being opened. A remove only acts on the device
//! that is currently tracked, and never touches a claim it does not own.

use std::sync::atomic::Ordering;
use std::sync::Weak;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::descriptor::Descriptor;
use super::error::DeviceError;
use super::input_device::{InputDevice, ScanState, Shared, NO_DEVICE};
use super::matching::match_candidate;
use super::runtime::HotplugEvent;

impl Shared {
    pub(super) fn device_added(&self, candidate: &Descriptor, index: i32) -> bool {
        if self.has_open() || self.is_opening.load(Ordering::Acquire) {
            debug!("Ignoring added {}: device open or opening", candidate);
            return false;
        }

        if !self.try_claim_opening() {
            debug!("Ignoring added {}: lost claim race", candidate);
            return false;
        }

        // a caller may have taken the scan gate and be waiting for this claim
        if self.has_open() || self.scan_state() == ScanState::Scanning {
            self.is_opening.store(false, Ordering::Release);
            debug!("Ignoring added {}: scan in flight", candidate);
            return false;
        }

        let tier = {
            let desired = self.desired.read();
            desired
                .as_ref()
                .and_then(|desired| match_candidate(desired, candidate))
        };

        let Some(tier) = tier else {
            self.is_opening.store(false, Ordering::Release);
            debug!("Added {} does not match the desired device", candidate);
            return false;
        };

        info!("Hotplug {:?} match for {} at #{}", tier, candidate, index);
        let opened = self.open_and_publish(index);
        self.is_opening.store(false, Ordering::Release);
        opened
    }

    pub(super) fn device_removed(&self, index: i32) -> bool {
        let tracked = self.tracked.load(Ordering::Acquire);
        if tracked == NO_DEVICE || tracked != index {
            debug!("Ignoring removal of untracked device #{}", index);
            return false;
        }

        info!("Tracked device #{} removed, closing it", index);
        // is_opening belongs to whichever scan or add claimed it
        self.close();
        true
    }
}

impl InputDevice {
    /// Offers a newly attached device, returns whether it was claimed
    pub fn on_device_added(&self, candidate: Descriptor, index: i32) -> bool {
        let _entered = self.shared().span.enter();
        self.shared().device_added(&candidate, index)
    }

    /// Reports a detached device, returns whether the tracked device was closed
    pub fn on_device_removed(&self, index: i32) -> bool {
        let _entered = self.shared().span.enter();
        self.shared().device_removed(index)
    }

    /// Feeds runtime hotplug events into this engine from a background thread
    ///
    /// The thread exits when the sender side closes or the engine is dropped.
    pub fn listen_hotplug(
        &self,
        mut events: mpsc::UnboundedReceiver<HotplugEvent>,
    ) -> Result<(), DeviceError> {
        let shared = std::sync::Arc::downgrade(self.shared());
        let span = self.shared().span.clone();

        std::thread::Builder::new()
            .name("padlink-hotplug".into())
            .spawn(move || {
                let _entered = span.enter();
                info!("Hotplug listener started");
                while let Some(event) = events.blocking_recv() {
                    if !dispatch(&shared, event) {
                        break;
                    }
                }
                info!("Hotplug listener finished");
            })
            .map_err(|source| DeviceError::ThreadSpawn {
                name: "hotplug",
                source,
            })?;
        Ok(())
    }
}

/// Routes one event, false once the engine is gone
fn dispatch(shared: &Weak<Shared>, event: HotplugEvent) -> bool {
    let Some(shared) = shared.upgrade() else {
        return false;
    };
    match event {
        HotplugEvent::Added { candidate, index } => {
            let claimed = shared.device_added(&candidate, index);
            debug!("Hotplug add #{} claimed={}", index, claimed);
        }
        HotplugEvent::Removed { index } => {
            let claimed = shared.device_removed(index);
            debug!("Hotplug remove #{} claimed={}", index, claimed);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::runtime::{HardwareRuntime, RawHandle};
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;
    use tracing::Span;

    #[derive(Default)]
    struct Counter(AtomicU64);

    impl HardwareRuntime for Counter {
        fn enumerate_devices(&self) -> Vec<Descriptor> {
            Vec::new()
        }
        fn is_controller(&self, _index: i32) -> bool {
            false
        }
        fn open_joystick(&self, _index: i32) -> Option<RawHandle> {
            RawHandle::new(self.0.fetch_add(1, Ordering::SeqCst) + 1)
        }
        fn open_controller(&self, _index: i32) -> Option<RawHandle> {
            None
        }
        fn close_joystick(&self, _handle: RawHandle) {}
        fn close_controller(&self, _handle: RawHandle) {}
        fn rumble_joystick(&self, _: RawHandle, _: u16, _: u16, _: u32) -> bool {
            false
        }
        fn rumble_controller(&self, _: RawHandle, _: u16, _: u16, _: u32) -> bool {
            false
        }
    }

    fn shared() -> Shared {
        Shared::new(Arc::new(Counter::default()), Span::none())
    }

    #[test]
    fn remove_leaves_a_foreign_claim_alone() {
        let shared = shared();
        // an add that has published but not yet released its claim
        assert!(shared.try_claim_opening());
        assert!(shared.open_and_publish(4));

        assert!(shared.device_removed(4));

        assert!(!shared.has_open());
        assert!(shared.is_opening.load(Ordering::Acquire));
        assert!(!shared.try_claim_opening());
    }

    #[test]
    fn open_interrupted_by_close_keeps_flags_consistent() {
        let shared = shared();
        assert!(shared.open_and_publish(2));
        shared.close();

        assert!(!shared.has_open());
        assert_eq!(shared.tracked.load(Ordering::Acquire), NO_DEVICE);
        assert!(!shared.device_added(&Descriptor::new("Pad", "", "", 2), 2));

        *shared.desired.write() = Some(Descriptor::new("Pad", "", "", 0));
        assert!(shared.device_added(&Descriptor::new("Pad", "", "", 2), 2));
        assert!(shared.has_open());
        assert_eq!(shared.tracked.load(Ordering::Acquire), 2);
    }
}
