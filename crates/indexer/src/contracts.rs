use std::collections::BTreeSet;

use alloy::primitives::Address;
use kye_core::normalize_address;
use tracing::warn;

/// The set of contract addresses scanned every cycle.
///
/// Always contains the factory. Everything else is a circle contract.
#[derive(Debug, Clone)]
pub struct MonitoredContracts {
    factory: Address,
    circles: BTreeSet<Address>,
}

impl MonitoredContracts {
    pub fn new(factory: Address) -> Self {
        Self {
            factory,
            circles: BTreeSet::new(),
        }
    }

    /// Seed from persisted contracts and active circles. Unparseable
    /// addresses are logged and ignored.
    pub fn seed<'a>(
        factory: Address,
        stored: impl IntoIterator<Item = &'a str>,
        active_circles: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut set = Self::new(factory);
        for raw in stored.into_iter().chain(active_circles) {
            match parse_address(raw) {
                Some(address) => {
                    set.insert(address);
                }
                None => warn!(address = %raw, "Ignoring malformed contract address"),
            }
        }
        set
    }

    pub fn factory(&self) -> Address {
        self.factory
    }

    pub fn is_factory(&self, address: &Address) -> bool {
        *address == self.factory
    }

    /// Returns `true` when the address was not monitored yet.
    pub fn insert(&mut self, address: Address) -> bool {
        if self.is_factory(&address) {
            return false;
        }
        self.circles.insert(address)
    }

    /// The factory itself cannot be removed.
    pub fn remove(&mut self, address: &Address) -> bool {
        self.circles.remove(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.is_factory(address) || self.circles.contains(address)
    }

    /// Factory first, then circles in address order.
    pub fn iter(&self) -> impl Iterator<Item = Address> + '_ {
        std::iter::once(self.factory).chain(self.circles.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.circles.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Parse a `0x` address in any case.
pub fn parse_address(raw: &str) -> Option<Address> {
    normalize_address(raw).ok()?.parse().ok()
}

/// Storage form of an address: lowercase `0x` hex.
pub fn format_address(address: &Address) -> String {
    format!("{address:#x}")
}
