//! Lock-free ownership of the one active hardware handle
//!
//! The active handle and its kind are packed into a single `AtomicU64`:
//!
//! ```text
//!  63 62 61                                   0
//! [tag ][          handle payload (62 bit)    ]
//!   00  none
//!   01  joystick
//!   10  controller
//! ```
//!
//! Since there is only one word, a joystick and a controller handle can never
//! be present at the same time, and a reader always sees either the old or the
//! new value in full.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use super::runtime::{HandleKind, HardwareRuntime, RawHandle};

const TAG_SHIFT: u32 = 62;
const TAG_JOYSTICK: u64 = 1;
const TAG_CONTROLLER: u64 = 2;
const EMPTY: u64 = 0;

/// Snapshot of the registry contents
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ActiveHandle {
    #[default]
    None,
    Joystick(RawHandle),
    Controller(RawHandle),
}

impl ActiveHandle {
    pub fn new(kind: HandleKind, handle: RawHandle) -> Self {
        match kind {
            HandleKind::Joystick => ActiveHandle::Joystick(handle),
            HandleKind::Controller => ActiveHandle::Controller(handle),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ActiveHandle::None)
    }

    pub fn kind(&self) -> Option<HandleKind> {
        match self {
            ActiveHandle::None => None,
            ActiveHandle::Joystick(_) => Some(HandleKind::Joystick),
            ActiveHandle::Controller(_) => Some(HandleKind::Controller),
        }
    }

    pub fn joystick(&self) -> Option<RawHandle> {
        match self {
            ActiveHandle::Joystick(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn controller(&self) -> Option<RawHandle> {
        match self {
            ActiveHandle::Controller(handle) => Some(*handle),
            _ => None,
        }
    }

    fn pack(self) -> u64 {
        match self {
            ActiveHandle::None => EMPTY,
            ActiveHandle::Joystick(handle) => (TAG_JOYSTICK << TAG_SHIFT) | handle.get(),
            ActiveHandle::Controller(handle) => (TAG_CONTROLLER << TAG_SHIFT) | handle.get(),
        }
    }

    fn unpack(word: u64) -> Self {
        let payload = RawHandle::new(word & RawHandle::MAX);
        match (word >> TAG_SHIFT, payload) {
            (TAG_JOYSTICK, Some(handle)) => ActiveHandle::Joystick(handle),
            (TAG_CONTROLLER, Some(handle)) => ActiveHandle::Controller(handle),
            _ => ActiveHandle::None,
        }
    }
}

/// Owns at most one open handle and closes it through the runtime
///
/// Only the context holding resolution rights publishes. Reads and closes are
/// allowed from anywhere.
pub struct HandleRegistry {
    active: AtomicU64,
    runtime: Arc<dyn HardwareRuntime>,
}

impl HandleRegistry {
    pub fn new(runtime: Arc<dyn HardwareRuntime>) -> Self {
        Self {
            active: AtomicU64::new(EMPTY),
            runtime,
        }
    }

    /// Current contents, never blocks and never sees a half-written handle
    pub fn get(&self) -> ActiveHandle {
        ActiveHandle::unpack(self.active.load(Ordering::Acquire))
    }

    /// Replaces the active handle
    ///
    /// A handle that was still present gets closed so it cannot leak.
    pub fn publish(&self, handle: ActiveHandle) {
        let previous = ActiveHandle::unpack(self.active.swap(handle.pack(), Ordering::AcqRel));
        debug!("Published handle {:?}", handle);
        if !previous.is_none() {
            debug!("Publishing replaced {:?}, closing it", previous);
            self.close_raw(previous);
        }
    }

    /// Closes whatever is active; always succeeds
    ///
    /// The swap makes sure only one of several concurrent callers sees the
    /// handle, so it is closed exactly once.
    pub fn close(&self) -> bool {
        let previous = ActiveHandle::unpack(self.active.swap(EMPTY, Ordering::AcqRel));
        if previous.is_none() {
            trace!("Close requested with no active handle");
        } else {
            self.close_raw(previous);
        }
        true
    }

    pub fn runtime(&self) -> &Arc<dyn HardwareRuntime> {
        &self.runtime
    }

    fn close_raw(&self, handle: ActiveHandle) {
        match handle {
            ActiveHandle::None => {}
            ActiveHandle::Joystick(raw) => {
                debug!("Closing joystick {}", raw);
                self.runtime.close_joystick(raw);
            }
            ActiveHandle::Controller(raw) => {
                debug!("Closing controller {}", raw);
                self.runtime.close_controller(raw);
            }
        }
    }
}

impl Drop for HandleRegistry {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::descriptor::Descriptor;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CloseLog {
        closed: Mutex<Vec<(HandleKind, u64)>>,
    }

    impl HardwareRuntime for CloseLog {
        fn enumerate_devices(&self) -> Vec<Descriptor> {
            Vec::new()
        }
        fn is_controller(&self, _index: i32) -> bool {
            false
        }
        fn open_joystick(&self, _index: i32) -> Option<RawHandle> {
            None
        }
        fn open_controller(&self, _index: i32) -> Option<RawHandle> {
            None
        }
        fn close_joystick(&self, handle: RawHandle) {
            self.closed.lock().push((HandleKind::Joystick, handle.get()));
        }
        fn close_controller(&self, handle: RawHandle) {
            self.closed.lock().push((HandleKind::Controller, handle.get()));
        }
        fn rumble_joystick(&self, _: RawHandle, _: u16, _: u16, _: u32) -> bool {
            false
        }
        fn rumble_controller(&self, _: RawHandle, _: u16, _: u16, _: u32) -> bool {
            false
        }
    }

    fn handle(value: u64) -> RawHandle {
        RawHandle::new(value).unwrap()
    }

    #[test]
    fn pack_round_trips_every_variant() {
        for active in [
            ActiveHandle::None,
            ActiveHandle::Joystick(handle(0)),
            ActiveHandle::Joystick(handle(RawHandle::MAX)),
            ActiveHandle::Controller(handle(42)),
        ] {
            assert_eq!(ActiveHandle::unpack(active.pack()), active);
        }
    }

    #[test]
    fn close_twice_closes_once_and_reports_success() {
        let log = Arc::new(CloseLog::default());
        let registry = HandleRegistry::new(log.clone());
        registry.publish(ActiveHandle::Controller(handle(7)));

        assert!(registry.close());
        assert!(registry.close());
        assert_eq!(registry.get(), ActiveHandle::None);
        assert_eq!(*log.closed.lock(), vec![(HandleKind::Controller, 7)]);
    }

    #[test]
    fn publish_closes_replaced_handle() {
        let log = Arc::new(CloseLog::default());
        let registry = HandleRegistry::new(log.clone());
        registry.publish(ActiveHandle::Joystick(handle(1)));
        registry.publish(ActiveHandle::Controller(handle(2)));

        assert_eq!(registry.get(), ActiveHandle::Controller(handle(2)));
        assert_eq!(registry.get().joystick(), None);
        assert_eq!(*log.closed.lock(), vec![(HandleKind::Joystick, 1)]);
    }

    #[test]
    fn drop_closes_open_handle() {
        let log = Arc::new(CloseLog::default());
        {
            let registry = HandleRegistry::new(log.clone());
            registry.publish(ActiveHandle::Joystick(handle(3)));
        }
        assert_eq!(*log.closed.lock(), vec![(HandleKind::Joystick, 3)]);
    }

    #[test]
    fn concurrent_closes_close_exactly_once() {
        let log = Arc::new(CloseLog::default());
        let registry = Arc::new(HandleRegistry::new(log.clone()));
        registry.publish(ActiveHandle::Controller(handle(9)));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.close())
            })
            .collect();
        for worker in workers {
            assert!(worker.join().unwrap());
        }
        assert_eq!(log.closed.lock().len(), 1);
    }
}
