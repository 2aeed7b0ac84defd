//! Setup errors for the device subsystem
//!
//! Runtime operations (open, close, rumble, hotplug) never fail with an
//! error; they report through booleans and flags. Only wiring the subsystem
//! up can fail.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    /// A worker thread could not be started
    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The hardware runtime did not come up
    #[error("Hardware runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// A worker went away before answering
    #[error("Channel error: {0}")]
    ChannelError(String),
}
