//! Hardware-address validation
//!
//! Checks a finished program plus its tag-to-address map against a
//! target capability description. Pure: never mutates the program,
//! returns every violation found rather than stopping at the first.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use relay_model::{AddressMap, HwAddress, Instruction, Program, Region, TagId, ValueKind};

/// What one region of the target exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionCaps {
    /// Valid indices are `0..size`.
    pub size: u16,
    /// Whether the program side may write here.
    pub writable: bool,
    /// Value kinds the region's registers can carry.
    pub kinds: Vec<ValueKind>,
}

impl RegionCaps {
    pub fn supports(&self, kind: ValueKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// Capability description of one deployment target. Regions absent
/// from the map do not exist on the target at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetCaps {
    regions: IndexMap<Region, RegionCaps>,
    /// Upper bound on mapped tags, if the target imposes one.
    pub max_mapped: Option<usize>,
}

impl TargetCaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(mut self, region: Region, caps: RegionCaps) -> Self {
        self.regions.insert(region, caps);
        self
    }

    pub fn with_max_mapped(mut self, max: usize) -> Self {
        self.max_mapped = Some(max);
        self
    }

    pub fn region(&self, region: Region) -> Option<&RegionCaps> {
        self.regions.get(&region)
    }

    /// A typical relay target: bit-only input/output banks plus a
    /// 16-bit-register holding bank.
    pub fn relay_io(inputs: u16, outputs: u16, holding: u16) -> Self {
        Self::new()
            .with_region(
                Region::Input,
                RegionCaps {
                    size: inputs,
                    writable: false,
                    kinds: vec![ValueKind::Bool],
                },
            )
            .with_region(
                Region::Output,
                RegionCaps {
                    size: outputs,
                    writable: true,
                    kinds: vec![ValueKind::Bool],
                },
            )
            .with_region(
                Region::Holding,
                RegionCaps {
                    size: holding,
                    writable: true,
                    kinds: vec![
                        ValueKind::I16,
                        ValueKind::U16,
                        ValueKind::I32,
                        ValueKind::U32,
                    ],
                },
            )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Address in a region the target does not expose.
    Unmapped,
    /// Address index beyond the region's size.
    OutOfRange,
    /// Program writes a tag mapped into a read-only region.
    RegionReadOnly,
    /// Tag kind not representable in the mapped region.
    KindUnsupported,
    /// Two tags mapped to the same address.
    DuplicateAddress,
    /// More tags mapped than the target allows.
    CapacityExceeded,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ViolationKind::Unmapped => "unmapped",
            ViolationKind::OutOfRange => "out-of-range",
            ViolationKind::RegionReadOnly => "region-read-only",
            ViolationKind::KindUnsupported => "kind-unsupported",
            ViolationKind::DuplicateAddress => "duplicate-address",
            ViolationKind::CapacityExceeded => "capacity-exceeded",
        };
        f.write_str(name)
    }
}

/// One finding; `tag` is the mapped or instruction-bound tag involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub tag: TagId,
    pub reason: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on {}: {}", self.kind, self.tag, self.reason)
    }
}

/// Validate a program and its address map against a target. Violations
/// come out in a deterministic order: map entries first (map order),
/// then wire instructions in source order, then capacity.
pub fn validate(program: &Program, map: &AddressMap, caps: &TargetCaps) -> Vec<Violation> {
    let mut violations = Vec::new();

    let written = written_tags(program);

    let mut seen: IndexMap<HwAddress, TagId> = IndexMap::new();
    for (tag, address) in map.iter() {
        if let Some(prior) = seen.get(&address) {
            violations.push(Violation {
                kind: ViolationKind::DuplicateAddress,
                tag,
                reason: format!("{address} already mapped to {prior}"),
            });
        } else {
            seen.insert(address, tag);
        }

        let region = match caps.region(address.region) {
            Some(region) => region,
            None => {
                violations.push(Violation {
                    kind: ViolationKind::Unmapped,
                    tag,
                    reason: format!("target has no {} region", address.region),
                });
                continue;
            }
        };
        if address.index >= region.size {
            violations.push(Violation {
                kind: ViolationKind::OutOfRange,
                tag,
                reason: format!(
                    "{address} beyond region size {}",
                    region.size
                ),
            });
        }
        if let Ok(kind) = program.tags().kind_of(tag) {
            if !region.supports(kind) {
                violations.push(Violation {
                    kind: ViolationKind::KindUnsupported,
                    tag,
                    reason: format!("{} region cannot carry {kind}", address.region),
                });
            }
        }
        if !region.writable && written.contains(&tag) {
            violations.push(Violation {
                kind: ViolationKind::RegionReadOnly,
                tag,
                reason: format!("program writes a tag mapped to read-only {}", address.region),
            });
        }
    }

    for (_, instruction) in program.instructions() {
        let (tag, address, writes_remote) = match instruction {
            Instruction::Send { tag, address } => (*tag, *address, true),
            Instruction::Receive { tag, address } => (*tag, *address, false),
            _ => continue,
        };
        let region = match caps.region(address.region) {
            Some(region) => region,
            None => {
                violations.push(Violation {
                    kind: ViolationKind::Unmapped,
                    tag,
                    reason: format!(
                        "{} exchanges with {address} in a region the target lacks",
                        instruction.mnemonic()
                    ),
                });
                continue;
            }
        };
        if address.index >= region.size {
            violations.push(Violation {
                kind: ViolationKind::OutOfRange,
                tag,
                reason: format!("{} address {address} beyond region size {}", instruction.mnemonic(), region.size),
            });
        }
        if writes_remote && !region.writable {
            violations.push(Violation {
                kind: ViolationKind::RegionReadOnly,
                tag,
                reason: format!("send targets read-only {}", address.region),
            });
        }
    }

    if let Some(max) = caps.max_mapped {
        if map.len() > max {
            // Attribute the finding to the first tag past the limit.
            if let Some((tag, _)) = map.iter().nth(max) {
                violations.push(Violation {
                    kind: ViolationKind::CapacityExceeded,
                    tag,
                    reason: format!("{} tags mapped, target allows {max}", map.len()),
                });
            }
        }
    }

    debug!(count = violations.len(), "validation finished");
    violations
}

/// Tags the program writes through any instruction effect. `receive`
/// counts: it stores into its tag.
fn written_tags(program: &Program) -> Vec<TagId> {
    let mut tags: Vec<TagId> = program
        .instructions()
        .filter(|(_, i)| !matches!(i, Instruction::Send { .. }))
        .map(|(_, i)| i.target())
        .collect();
    tags.sort_unstable();
    tags.dedup();
    tags
}
