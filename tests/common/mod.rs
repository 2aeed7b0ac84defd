#![allow(dead_code)]

use padlink::device::{
    Descriptor, EngineSettings, HandleKind, HardwareRuntime, InputDevice, RawHandle, ScanState,
};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rumble {
    pub kind: HandleKind,
    pub handle: RawHandle,
    pub strong: u16,
    pub weak: u16,
    pub duration_ms: u32,
}

/// In-memory runtime recording every call the engine makes
#[derive(Default)]
pub struct FakeRuntime {
    devices: Mutex<Vec<Descriptor>>,
    controllers: Mutex<HashSet<i32>>,
    broken: Mutex<HashSet<i32>>,
    scan_gate: Mutex<()>,
    next_handle: AtomicU64,
    rumble_rejected: AtomicBool,
    pub opened: Mutex<Vec<(HandleKind, i32, RawHandle)>>,
    pub closed: Mutex<Vec<(HandleKind, RawHandle)>>,
    pub rumbles: Mutex<Vec<Rumble>>,
}

impl FakeRuntime {
    pub fn with_devices(devices: Vec<Descriptor>) -> Arc<Self> {
        let runtime = Self::default();
        *runtime.devices.lock() = devices;
        Arc::new(runtime)
    }

    pub fn set_devices(&self, devices: Vec<Descriptor>) {
        *self.devices.lock() = devices;
    }

    pub fn mark_controller(&self, index: i32) {
        self.controllers.lock().insert(index);
    }

    /// Opening `index` will fail
    pub fn mark_broken(&self, index: i32) {
        self.broken.lock().insert(index);
    }

    pub fn reject_rumble(&self) {
        self.rumble_rejected.store(true, Ordering::SeqCst);
    }

    /// Blocks every enumeration until the guard is dropped
    pub fn hold_scans(&self) -> MutexGuard<'_, ()> {
        self.scan_gate.lock()
    }

    pub fn opened_indices(&self) -> Vec<i32> {
        self.opened.lock().iter().map(|(_, index, _)| *index).collect()
    }

    fn open_kind(&self, kind: HandleKind, index: i32) -> Option<RawHandle> {
        if self.broken.lock().contains(&index) {
            return None;
        }
        let handle = RawHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst) + 100)?;
        self.opened.lock().push((kind, index, handle));
        Some(handle)
    }

    fn record_rumble(
        &self,
        kind: HandleKind,
        handle: RawHandle,
        strong: u16,
        weak: u16,
        duration_ms: u32,
    ) -> bool {
        self.rumbles.lock().push(Rumble {
            kind,
            handle,
            strong,
            weak,
            duration_ms,
        });
        !self.rumble_rejected.load(Ordering::SeqCst)
    }
}

impl HardwareRuntime for FakeRuntime {
    fn enumerate_devices(&self) -> Vec<Descriptor> {
        let _gate = self.scan_gate.lock();
        self.devices.lock().clone()
    }

    fn is_controller(&self, index: i32) -> bool {
        self.controllers.lock().contains(&index)
    }

    fn open_joystick(&self, index: i32) -> Option<RawHandle> {
        self.open_kind(HandleKind::Joystick, index)
    }

    fn open_controller(&self, index: i32) -> Option<RawHandle> {
        self.open_kind(HandleKind::Controller, index)
    }

    fn close_joystick(&self, handle: RawHandle) {
        self.closed.lock().push((HandleKind::Joystick, handle));
    }

    fn close_controller(&self, handle: RawHandle) {
        self.closed.lock().push((HandleKind::Controller, handle));
    }

    fn rumble_joystick(&self, handle: RawHandle, strong: u16, weak: u16, duration_ms: u32) -> bool {
        self.record_rumble(HandleKind::Joystick, handle, strong, weak, duration_ms)
    }

    fn rumble_controller(
        &self,
        handle: RawHandle,
        strong: u16,
        weak: u16,
        duration_ms: u32,
    ) -> bool {
        self.record_rumble(HandleKind::Controller, handle, strong, weak, duration_ms)
    }
}

pub fn d(name: &str, path: &str, serial: &str, index: i32) -> Descriptor {
    Descriptor::new(name, path, serial, index)
}

pub fn engine(runtime: &Arc<FakeRuntime>) -> InputDevice {
    InputDevice::spawn(
        runtime.clone(),
        Some(EngineSettings {
            idle_poll_interval_ms: 1,
        }),
    )
    .unwrap()
}

pub fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Waits until the engine has no scan in flight
pub fn settle(engine: &InputDevice) {
    wait_until("scan to resolve", || {
        !engine.is_opening_device() && engine.scan_state() == ScanState::Idle
    });
}

/// Opens `desired` and waits for the scan to resolve
pub fn open_and_settle(engine: &InputDevice, desired: Descriptor) {
    engine.open_device(desired);
    settle(engine);
}
