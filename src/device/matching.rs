//! Tiered device matching
//!
//! A desired [`Descriptor`] is matched against discovered devices in three
//! tiers, first hit wins:
//!
//! 1. [`MatchTier::Exact`] - name, path, serial and index all equal
//! 2. [`MatchTier::Serial`] - name and serial equal, only tried when the
//!    desired serial is non-empty
//! 3. [`MatchTier::Name`] - name equal
//!
//! Within tiers 2 and 3 the first device in enumeration order is taken. The
//! index hint only takes part in tier 1.

use tracing::{debug, trace};

use super::descriptor::{Descriptor, DiscoveredDevice};

/// Which rule selected a device, ordered from strongest to weakest
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    /// Name, path, serial and index all equal
    Exact,
    /// Name and a non-empty serial equal
    Serial,
    /// Name equal, first in enumeration order wins
    Name,
}

/// Selects the best match for `desired` out of one scan's devices
pub fn select<'a>(
    desired: &Descriptor,
    candidates: &'a [DiscoveredDevice],
) -> Option<(MatchTier, &'a DiscoveredDevice)> {
    if let Some(device) = candidates.iter().find(|c| *c == desired) {
        return Some((MatchTier::Exact, device));
    }

    if desired.has_serial() {
        if let Some(device) = candidates
            .iter()
            .find(|c| c.name == desired.name && c.serial == desired.serial)
        {
            return Some((MatchTier::Serial, device));
        }
    }

    candidates
        .iter()
        .find(|c| c.name == desired.name)
        .map(|device| (MatchTier::Name, device))
}

/// Matches a single hotplugged candidate against `desired`
///
/// Hotplug indices are not stable across events, so the exact tier compares
/// everything except the index.
pub fn match_candidate(desired: &Descriptor, candidate: &Descriptor) -> Option<MatchTier> {
    let candidate = candidate.with_index(0);
    let desired = desired.with_index(0);
    select(&desired, std::slice::from_ref(&candidate)).map(|(tier, _)| tier)
}

/// Per-scan matching state
///
/// Lives on the thread that consumes scan notifications. [`Resolver::begin`]
/// starts a new cycle and drops whatever the previous cycle collected.
#[derive(Debug, Default)]
pub struct Resolver {
    desired: Option<Descriptor>,
    found: Vec<DiscoveredDevice>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, desired: Descriptor) {
        debug!("Resolver cycle started for {}", desired);
        self.found.clear();
        self.desired = Some(desired);
    }

    /// Records a discovered device, returns whether it was kept
    ///
    /// Devices with a different name can never satisfy any tier and are
    /// dropped right away.
    pub fn record(&mut self, device: DiscoveredDevice) -> bool {
        match &self.desired {
            Some(desired) if desired.name == device.name => {
                trace!("Keeping candidate {}", device);
                self.found.push(device);
                true
            }
            _ => {
                trace!("Ignoring candidate {}", device);
                false
            }
        }
    }

    pub fn candidates(&self) -> &[DiscoveredDevice] {
        &self.found
    }

    pub fn desired(&self) -> Option<&Descriptor> {
        self.desired.as_ref()
    }

    /// Ends the cycle and returns the selected device
    pub fn resolve(&mut self) -> Option<(MatchTier, DiscoveredDevice)> {
        let found = std::mem::take(&mut self.found);
        let desired = self.desired.as_ref()?;
        select(desired, &found).map(|(tier, device)| (tier, device.clone()))
    }
}
