//! Force feedback on the active handle
//!
//! Single attempt per call. A failed rumble does not touch the open state.

use tracing::{debug, warn};

use super::handle_registry::{ActiveHandle, HandleRegistry};
use super::input_device::InputDevice;

pub const MAX_INTENSITY: u16 = 0xFFFF;

/// Duration value meaning "until stopped"
pub const INDEFINITE_MS: u32 = u32::MAX;

fn rumble(registry: &HandleRegistry, strong: u16, weak: u16, duration_ms: u32) -> bool {
    let runtime = registry.runtime();
    let ok = match registry.get() {
        ActiveHandle::None => {
            debug!("Rumble requested without an open device");
            return false;
        }
        ActiveHandle::Controller(handle) => {
            runtime.rumble_controller(handle, strong, weak, duration_ms)
        }
        ActiveHandle::Joystick(handle) => runtime.rumble_joystick(handle, strong, weak, duration_ms),
    };

    if !ok {
        warn!(
            "Rumble strong={} weak={} for {}ms was rejected",
            strong, weak, duration_ms
        );
    }
    ok
}

pub fn start(registry: &HandleRegistry) -> bool {
    rumble(registry, MAX_INTENSITY, MAX_INTENSITY, INDEFINITE_MS)
}

pub fn stop(registry: &HandleRegistry) -> bool {
    rumble(registry, 0, 0, 0)
}

impl InputDevice {
    /// Full strength rumble until [`InputDevice::stop_rumble`]
    pub fn start_rumble(&self) -> bool {
        let _entered = self.shared().span.enter();
        start(&self.shared().registry)
    }

    pub fn stop_rumble(&self) -> bool {
        let _entered = self.shared().span.enter();
        stop(&self.shared().registry)
    }
}
