//! Background device scanner
//!
//! One request produces one scan cycle on the worker thread:
//!
//! ```text
//! start_scan(desired) ──► Started(desired) ──► Discovered(..)* ──► Finished
//! ```
//!
//! All events of a cycle travel through the same FIFO channel, so `Finished`
//! is always seen after every `Discovered` of its cycle. The worker itself is
//! a statum machine that can only report devices while `Scanning`.

use statum::{machine, state};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Span};

use super::descriptor::{Descriptor, DiscoveredDevice};
use super::error::DeviceError;
use super::runtime::HardwareRuntime;

/// Notification delivered from the scanner to the resolver
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanEvent {
    Started(Descriptor),
    Discovered(DiscoveredDevice),
    Finished,
}

/// Phases of the scan worker
///
/// - `Idle`: waiting for the next request
/// - `Scanning`: a cycle has been announced and may report devices
#[state]
#[derive(Debug, Clone)]
pub enum ScanPhase {
    Idle,
    Scanning,
}

/// Enumerates through the runtime and reports on the event channel
#[machine]
pub struct ScanWorker<S: ScanPhase> {
    runtime: Arc<dyn HardwareRuntime>,
    events: mpsc::UnboundedSender<ScanEvent>,
    // completed cycles, for diagnostics
    cycles: u64,
}

/// The event receiver was dropped, nobody listens anymore
#[derive(Debug)]
pub struct ListenerGone;

impl<S: ScanPhase> ScanWorker<S> {
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn emit(&self, event: ScanEvent) -> Result<(), ListenerGone> {
        self.events.send(event).map_err(|_| ListenerGone)
    }
}

impl ScanWorker<Idle> {
    pub fn create(
        runtime: Arc<dyn HardwareRuntime>,
        events: mpsc::UnboundedSender<ScanEvent>,
    ) -> Self {
        Self::new(runtime, events, 0)
    }

    pub fn begin(self, desired: Descriptor) -> Result<ScanWorker<Scanning>, ListenerGone> {
        debug!("Scan cycle {} started for {}", self.cycles + 1, desired);
        self.emit(ScanEvent::Started(desired))?;
        Ok(self.transition())
    }
}

impl ScanWorker<Scanning> {
    /// Enumerates once and reports every device, returns how many were seen
    pub fn enumerate(&mut self) -> Result<usize, ListenerGone> {
        let devices = self.runtime.enumerate_devices();
        let count = devices.len();
        for device in devices {
            debug!("Discovered {}", device);
            self.emit(ScanEvent::Discovered(device))?;
        }
        Ok(count)
    }

    pub fn finish(mut self) -> Result<ScanWorker<Idle>, ListenerGone> {
        self.emit(ScanEvent::Finished)?;
        self.cycles += 1;
        Ok(self.transition())
    }
}

/// Handle to the scanner thread
///
/// Dropping it closes the request channel, the worker then exits after the
/// cycle it is in.
pub struct Scanner {
    requests: mpsc::UnboundedSender<Descriptor>,
}

impl Scanner {
    pub fn spawn(
        runtime: Arc<dyn HardwareRuntime>,
        events: mpsc::UnboundedSender<ScanEvent>,
        span: Span,
    ) -> Result<Self, DeviceError> {
        let (requests, mut request_rx) = mpsc::unbounded_channel::<Descriptor>();
        let worker = ScanWorker::create(runtime, events);

        std::thread::Builder::new()
            .name("padlink-scanner".into())
            .spawn(move || {
                let _entered = span.enter();
                info!("Scanner thread started");

                let mut worker = worker;
                while let Some(desired) = request_rx.blocking_recv() {
                    worker = match run_cycle(worker, desired) {
                        Ok(idle) => idle,
                        Err(ListenerGone) => {
                            warn!("Scan listener dropped, stopping scanner");
                            return;
                        }
                    };
                }

                info!("Scanner thread finished after {} cycles", worker.cycles());
            })
            .map_err(|source| DeviceError::ThreadSpawn {
                name: "scanner",
                source,
            })?;

        Ok(Self { requests })
    }

    /// Queues a scan cycle, false when the worker is gone
    pub fn start_scan(&self, desired: Descriptor) -> bool {
        match self.requests.send(desired) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to request scan: {}", e);
                false
            }
        }
    }
}

fn run_cycle(
    worker: ScanWorker<Idle>,
    desired: Descriptor,
) -> Result<ScanWorker<Idle>, ListenerGone> {
    let mut scanning = worker.begin(desired)?;
    let count = scanning.enumerate()?;
    debug!("Scan reported {} device(s)", count);
    scanning.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::runtime::RawHandle;

    struct FixedDevices(Vec<Descriptor>);

    impl HardwareRuntime for FixedDevices {
        fn enumerate_devices(&self) -> Vec<Descriptor> {
            self.0.clone()
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
        fn close_joystick(&self, _handle: RawHandle) {}
        fn close_controller(&self, _handle: RawHandle) {}
        fn rumble_joystick(&self, _: RawHandle, _: u16, _: u16, _: u32) -> bool {
            false
        }
        fn rumble_controller(&self, _: RawHandle, _: u16, _: u16, _: u32) -> bool {
            false
        }
    }

    #[test]
    fn cycle_reports_started_devices_then_finished() {
        let devices = vec![
            Descriptor::new("Pad", "p1", "", 0),
            Descriptor::new("Stick", "p2", "", 1),
        ];
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scanner =
            Scanner::spawn(Arc::new(FixedDevices(devices.clone())), tx, Span::none()).unwrap();

        let desired = Descriptor::new("Pad", "", "", 0);
        assert!(scanner.start_scan(desired.clone()));

        assert_eq!(rx.blocking_recv(), Some(ScanEvent::Started(desired)));
        assert_eq!(rx.blocking_recv(), Some(ScanEvent::Discovered(devices[0].clone())));
        assert_eq!(rx.blocking_recv(), Some(ScanEvent::Discovered(devices[1].clone())));
        assert_eq!(rx.blocking_recv(), Some(ScanEvent::Finished));
    }

    #[test]
    fn empty_enumeration_still_finishes_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scanner = Scanner::spawn(Arc::new(FixedDevices(Vec::new())), tx, Span::none()).unwrap();
        let desired = Descriptor::new("Pad", "", "", 0);
        assert!(scanner.start_scan(desired.clone()));
        drop(scanner);

        assert_eq!(rx.blocking_recv(), Some(ScanEvent::Started(desired)));
        assert_eq!(rx.blocking_recv(), Some(ScanEvent::Finished));
        assert_eq!(rx.blocking_recv(), None);
    }

    #[test]
    fn worker_counts_cycles() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let worker = ScanWorker::create(Arc::new(FixedDevices(Vec::new())), tx);
        let worker = run_cycle(worker, Descriptor::default()).unwrap();
        let worker = run_cycle(worker, Descriptor::default()).unwrap();
        assert_eq!(worker.cycles(), 2);
    }
}
