//! Hardware address mapping
//!
//! Maps tags to physical addresses on a target. The same map feeds the
//! address validator and the wire-protocol register surface.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::tag::TagId;

/// Addressable region on a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    /// Physical inputs; read-only from the program's point of view.
    Input,
    /// Physical outputs.
    Output,
    /// General-purpose registers.
    Holding,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Region::Input => "input",
            Region::Output => "output",
            Region::Holding => "holding",
        };
        write!(f, "{name}")
    }
}

/// A physical address: region plus index within the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HwAddress {
    pub region: Region,
    pub index: u16,
}

impl fmt::Display for HwAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.region, self.index)
    }
}

/// Tag-to-address map for one target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressMap {
    entries: IndexMap<TagId, HwAddress>,
}

impl AddressMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, tag: TagId, address: HwAddress) {
        self.entries.insert(tag, address);
    }

    pub fn address_of(&self, tag: TagId) -> Option<HwAddress> {
        self.entries.get(&tag).copied()
    }

    /// Reverse lookup: the tag mapped at an address, if any.
    pub fn tag_at(&self, address: HwAddress) -> Option<TagId> {
        self.entries
            .iter()
            .find(|(_, a)| **a == address)
            .map(|(t, _)| *t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TagId, HwAddress)> + '_ {
        self.entries.iter().map(|(t, a)| (*t, *a))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
