use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a physical input device
///
/// Used both for the device a caller asks for and for every device a scan
/// reports. Two descriptors are an exact match only when all four fields
/// are equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    /// Human readable product name reported by the runtime
    pub name: String,
    /// Connection path (bus path or runtime specific locator)
    #[serde(default)]
    pub path: String,
    /// Serial number, empty when the device does not report one
    #[serde(default)]
    pub serial: String,
    /// Enumeration index hint
    #[serde(default)]
    pub index: i32,
}

/// A device reported by one scan cycle
pub type DiscoveredDevice = Descriptor;

impl Descriptor {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        serial: impl Into<String>,
        index: i32,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            serial: serial.into(),
            index,
        }
    }

    pub fn has_serial(&self) -> bool {
        !self.serial.is_empty()
    }

    /// Copy of this descriptor with the index replaced
    pub fn with_index(&self, index: i32) -> Self {
        Self {
            index,
            ..self.clone()
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" [#{}", self.name, self.index)?;
        if !self.path.is_empty() {
            write!(f, ", path={}", self.path)?;
        }
        if !self.serial.is_empty() {
            write!(f, ", serial={}", self.serial)?;
        }
        write!(f, "]")
    }
}
