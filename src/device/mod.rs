//! Device subsystem: turns a desired descriptor into one open gamepad handle
//!
//! 1. [`descriptor`] - identity of a device
//! 2. [`runtime`] - the hardware seam ([`HardwareRuntime`])
//! 3. [`scanner`] - background enumeration, one cycle per open request
//! 4. [`matching`] - exact / serial / name tiers
//! 5. [`handle_registry`] - the one active handle, published atomically
//! 6. [`hotplug`] - opportunistic claims and releases outside a scan
//! 7. [`rumble`] - force feedback on the active handle
//! 8. [`input_device`] - the engine tying it all together
//!
//! # Architecture
//!
//! ```text
//! open_device ──► Scanner ──► Resolver ──► HandleRegistry ◄── Hotplug
//!                 (thread)    (thread)       (atomic)
//! ```

pub mod descriptor;
pub mod error;
pub mod gilrs_runtime;
pub mod handle_registry;
pub mod hotplug;
pub mod input_device;
pub mod matching;
pub mod rumble;
pub mod runtime;
pub mod scanner;

pub use descriptor::{Descriptor, DiscoveredDevice};
pub use error::DeviceError;
pub use gilrs_runtime::{GilrsRuntime, GilrsSettings};
pub use handle_registry::{ActiveHandle, HandleRegistry};
pub use input_device::{DeviceState, EngineSettings, InputDevice, ScanState};
pub use matching::{MatchTier, Resolver};
pub use runtime::{HandleKind, HardwareRuntime, HotplugEvent, RawHandle};
pub use scanner::{ScanEvent, Scanner};
