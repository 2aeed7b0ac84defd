//! InputDevice - resolves a desired descriptor into one open device
//!
//! Coordinates three contexts over shared state without a mutex:
//!
//! ```text
//! caller ──open_device──► Scanner thread ──ScanEvent──► dispatcher thread
//!    │                                                   (Resolver)
//!    │                                                       │
//!    └──────── flags / HandleRegistry (atomics) ◄────────────┘
//!                          ▲
//! runtime hotplug ─────────┘ (on_device_added / on_device_removed)
//! ```
//!
//! `scan_state` is the gate for the desired descriptor: it is only written by
//! whoever moved the gate from `Idle` to `Scanning`, and the gate is released
//! after the scan's `Finished` event has been resolved. `is_opening` is the
//! claim on resolution rights; a scan and a hotplug claim never hold it at the
//! same time, and only the claimant ever clears it.
//!
//! Whether a device is open is not a separate flag. It is read straight from
//! the [`HandleRegistry`] word, so "open" and "handle present" can never
//! disagree, whatever order a concurrent close and an open land in.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Span};

use super::descriptor::Descriptor;
use super::error::DeviceError;
use super::handle_registry::{ActiveHandle, HandleRegistry};
use super::matching::Resolver;
use super::runtime::{HardwareRuntime, RawHandle};
use super::scanner::{ScanEvent, Scanner};

pub(super) const NO_DEVICE: i32 = -1;

/// Tunables for the engine
///
/// # Performance Impact
///
/// - `idle_poll_interval_ms`: lower values let a queued `open_device` start
///   sooner after the previous scan resolves, at the cost of more wakeups
///   while it waits
///
/// # Examples
///
/// ```rust
/// use padlink::device::EngineSettings;
///
/// let eager = EngineSettings {
///     idle_poll_interval_ms: 1,
/// };
/// assert!(eager.idle_poll_interval_ms < EngineSettings::default().idle_poll_interval_ms);
/// ```
#[derive(Clone, Debug)]
pub struct EngineSettings {
    /// Sleep between polls while `open_device` waits for the scanner to go idle
    ///
    /// Only matters when open requests overlap. A lone request acquires the
    /// gate on the first try. Clamped to at least 1ms.
    pub idle_poll_interval_ms: u64,
}

impl Default for EngineSettings {
    /// 5ms, short against a scan cycle and cheap while idle
    fn default() -> Self {
        Self {
            idle_poll_interval_ms: 5,
        }
    }
}

/// Gate guarding the desired descriptor, at most one scan is in flight
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ScanState {
    /// No scan queued or running, the next `open_device` may take the gate
    Idle = 0,
    /// A scan owns the desired descriptor until its `Finished` is resolved
    Scanning = 1,
}

/// Observable lifecycle of the engine's device
///
/// ```text
/// Closed ──open_device──► Opening ──match──► Open ──close/remove──► Closed
///    │                       └────no match──► Closed
///    └──────────────hotplug add──────────────► Open
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    /// No handle, nobody resolving
    Closed,
    /// A scan or hotplug claim holds resolution rights
    Opening,
    /// A handle is published
    Open,
}

/// State shared by the caller, dispatcher and hotplug threads
pub(super) struct Shared {
    pub(super) registry: HandleRegistry,
    scan_state: AtomicU8,
    pub(super) is_opening: AtomicBool,
    pub(super) tracked: AtomicI32,
    pub(super) desired: RwLock<Option<Descriptor>>,
    pub(super) span: Span,
}

impl Shared {
    pub(super) fn new(runtime: Arc<dyn HardwareRuntime>, span: Span) -> Self {
        Self {
            registry: HandleRegistry::new(runtime),
            scan_state: AtomicU8::new(ScanState::Idle as u8),
            is_opening: AtomicBool::new(false),
            tracked: AtomicI32::new(NO_DEVICE),
            desired: RwLock::new(None),
            span,
        }
    }

    /// True while the registry holds a handle
    pub(super) fn has_open(&self) -> bool {
        !self.registry.get().is_none()
    }

    pub(super) fn scan_state(&self) -> ScanState {
        match self.scan_state.load(Ordering::Acquire) {
            0 => ScanState::Idle,
            _ => ScanState::Scanning,
        }
    }

    fn try_acquire_scan_gate(&self) -> bool {
        self.scan_state
            .compare_exchange(
                ScanState::Idle as u8,
                ScanState::Scanning as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn release_scan_gate(&self) {
        self.scan_state
            .store(ScanState::Idle as u8, Ordering::Release);
    }

    /// Claims resolution rights, fails while a scan or hotplug claim holds them
    pub(super) fn try_claim_opening(&self) -> bool {
        self.is_opening
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Opens the device at `index` with the API its kind calls for and
    /// publishes it, returns whether a handle was opened
    ///
    /// The handle is published before `tracked` is set, so a remove for
    /// `index` can only act on a handle that is already visible.
    pub(super) fn open_and_publish(&self, index: i32) -> bool {
        match self.registry.runtime().open(index) {
            Some((kind, raw)) => {
                info!("Opened device #{} as {:?} ({})", index, kind, raw);
                self.registry.publish(ActiveHandle::new(kind, raw));
                self.tracked.store(index, Ordering::Release);
                // a close_device that ran between publish and the store above
                if !self.has_open() {
                    let _ = self.tracked.compare_exchange(
                        index,
                        NO_DEVICE,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                }
                true
            }
            None => {
                warn!("Runtime failed to open device #{}", index);
                false
            }
        }
    }

    /// Forgets the tracked index and closes the published handle, if any
    ///
    /// Safe from any thread and any number of times. Never touches
    /// `is_opening`: a claim in progress stays with its owner.
    pub(super) fn close(&self) -> bool {
        self.tracked.store(NO_DEVICE, Ordering::Release);
        self.registry.close()
    }

    fn handle_scan_event(&self, resolver: &mut Resolver, event: ScanEvent) {
        match event {
            ScanEvent::Started(desired) => resolver.begin(desired),
            ScanEvent::Discovered(device) => {
                if self.is_opening.load(Ordering::Acquire) {
                    resolver.record(device);
                }
            }
            ScanEvent::Finished => self.finish_scan(resolver),
        }
    }

    fn finish_scan(&self, resolver: &mut Resolver) {
        let selection = resolver.resolve();

        // the previous device goes away whether or not a new one is found
        self.close();

        let opened = match selection {
            Some((tier, device)) => {
                info!("Selected {} via {:?} match", device, tier);
                self.open_and_publish(device.index)
            }
            None => {
                info!(
                    "No device matched {}",
                    resolver
                        .desired()
                        .map(ToString::to_string)
                        .unwrap_or_default()
                );
                false
            }
        };

        self.is_opening.store(false, Ordering::Release);
        self.release_scan_gate();
        debug!(
            "Scan resolved, opened={} has_open_device={}",
            opened,
            self.has_open()
        );
    }
}

/// Public handle for the device resolution engine
///
/// Spawns a scanner thread and a dispatcher thread that runs the resolver.
/// Both stop on their own once the `InputDevice` is dropped; dropping also
/// closes any open device.
///
/// # Examples
///
/// ```rust,no_run
/// use padlink::device::{Descriptor, DeviceState, GilrsRuntime, InputDevice};
/// use std::sync::Arc;
///
/// let (runtime, hotplug) = GilrsRuntime::spawn(None)?;
/// let engine = InputDevice::spawn(Arc::new(runtime), None)?;
/// engine.listen_hotplug(hotplug)?;
///
/// engine.open_device(Descriptor::new("Xbox Wireless Controller", "", "", 0));
/// while engine.state() == DeviceState::Opening {
///     std::thread::sleep(std::time::Duration::from_millis(5));
/// }
/// if engine.has_open_device() {
///     engine.start_rumble();
/// }
/// # Ok::<(), padlink::device::DeviceError>(())
/// ```
pub struct InputDevice {
    shared: Arc<Shared>,
    scanner: Scanner,
    settings: EngineSettings,
}

impl InputDevice {
    pub fn spawn(
        runtime: Arc<dyn HardwareRuntime>,
        settings: Option<EngineSettings>,
    ) -> Result<Self, DeviceError> {
        Self::spawn_in(runtime, settings, info_span!("input_device"))
    }

    /// Like [`InputDevice::spawn`], logging every worker under `span`
    pub fn spawn_in(
        runtime: Arc<dyn HardwareRuntime>,
        settings: Option<EngineSettings>,
        span: Span,
    ) -> Result<Self, DeviceError> {
        let settings = settings.unwrap_or_default();
        let _entered = span.enter();
        info!("Spawning input device engine with settings: {:?}", settings);

        let shared = Arc::new(Shared::new(runtime.clone(), span.clone()));
        let (event_sender, event_receiver) = mpsc::unbounded_channel();

        let scanner = Scanner::spawn(runtime, event_sender, span.clone())?;
        spawn_dispatcher(Arc::downgrade(&shared), event_receiver, span.clone())?;

        info!("Input device engine ready");
        Ok(Self {
            shared,
            scanner,
            settings,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Requests `descriptor` and starts a scan for it
    ///
    /// Blocks in a short sleep/poll loop until any earlier scan is fully
    /// resolved. The outcome is observed through [`InputDevice::is_opening_device`]
    /// and [`InputDevice::has_open_device`]. Must not be called from inside an
    /// async task; use [`InputDevice::open_device_async`] there.
    pub fn open_device(&self, descriptor: Descriptor) {
        let _entered = self.shared.span.enter();
        let interval = self.poll_interval();

        while !self.shared.try_acquire_scan_gate() {
            std::thread::sleep(interval);
        }
        while !self.shared.try_claim_opening() {
            std::thread::sleep(interval);
        }

        self.dispatch_scan(descriptor);
    }

    /// Async twin of [`InputDevice::open_device`]
    pub async fn open_device_async(&self, descriptor: Descriptor) {
        let interval = self.poll_interval();

        while !self.shared.try_acquire_scan_gate() {
            tokio::time::sleep(interval).await;
        }
        while !self.shared.try_claim_opening() {
            tokio::time::sleep(interval).await;
        }

        let _entered = self.shared.span.enter();
        self.dispatch_scan(descriptor);
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.settings.idle_poll_interval_ms.max(1))
    }

    fn dispatch_scan(&self, descriptor: Descriptor) {
        info!("Opening device {}", descriptor);
        *self.shared.desired.write() = Some(descriptor.clone());

        if !self.scanner.start_scan(descriptor) {
            warn!("Scanner unavailable, giving up on open request");
            self.shared.is_opening.store(false, Ordering::Release);
            self.shared.release_scan_gate();
        }
    }

    /// Closes the open device, safe to call at any time; always true
    ///
    /// Does not cancel a scan in flight. If one is running, it may still open
    /// a device once it resolves.
    pub fn close_device(&self) -> bool {
        let _entered = self.shared.span.enter();
        debug!("Closing device on request");
        self.shared.close()
    }

    /// True exactly when [`InputDevice::get_handle`] is not `None`
    pub fn has_open_device(&self) -> bool {
        self.shared.has_open()
    }

    /// True while a scan or a hotplug claim is resolving
    pub fn is_opening_device(&self) -> bool {
        self.shared.is_opening.load(Ordering::Acquire)
    }

    pub fn scan_state(&self) -> ScanState {
        self.shared.scan_state()
    }

    /// Lifecycle state derived from the flags, `Opening` takes precedence
    pub fn state(&self) -> DeviceState {
        if self.is_opening_device() {
            DeviceState::Opening
        } else if self.has_open_device() {
            DeviceState::Open
        } else {
            DeviceState::Closed
        }
    }

    /// Current handle, one acquire load, never blocks
    pub fn get_handle(&self) -> ActiveHandle {
        self.shared.registry.get()
    }

    pub fn joystick_handle(&self) -> Option<RawHandle> {
        self.get_handle().joystick()
    }

    pub fn controller_handle(&self) -> Option<RawHandle> {
        self.get_handle().controller()
    }

    /// Runtime index of the open device, if any
    pub fn tracked_device(&self) -> Option<i32> {
        match self.shared.tracked.load(Ordering::Acquire) {
            NO_DEVICE => None,
            index => Some(index),
        }
    }

    /// Descriptor of the most recent open request
    pub fn desired_device(&self) -> Option<Descriptor> {
        self.shared.desired.read().clone()
    }

    pub(super) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

impl Drop for InputDevice {
    fn drop(&mut self) {
        self.close_device();
    }
}

fn spawn_dispatcher(
    shared: Weak<Shared>,
    mut events: mpsc::UnboundedReceiver<ScanEvent>,
    span: Span,
) -> Result<(), DeviceError> {
    std::thread::Builder::new()
        .name("padlink-dispatcher".into())
        .spawn(move || {
            let _entered = span.enter();
            debug!("Dispatcher thread started");

            let mut resolver = Resolver::new();
            while let Some(event) = events.blocking_recv() {
                let Some(shared) = shared.upgrade() else {
                    debug!("Engine dropped, discarding scan events");
                    break;
                };
                shared.handle_scan_event(&mut resolver, event);
            }

            debug!("Dispatcher thread finished");
        })
        .map_err(|source| DeviceError::ThreadSpawn {
            name: "dispatcher",
            source,
        })?;
    Ok(())
}
