//! PCI Express Enhanced Configuration Access Mechanism (ECAM).
//!
//! Each region maps the 4 KiB config space of every function on a range of
//! buses of one segment. The region's base address is the address bus 0
//! would have, so a function's config space lives at
//! `base + (bus << 20 | devfn << 12)` even when the region starts above
//! bus 0.
//!
//! The registry is read far more often than it changes, so it sits behind a
//! reader-writer lock. Regions are kept sorted by segment, then start bus.

use alloc::collections::TryReserveError;
use alloc::vec::Vec;

use spin::RwLock;
use trellis_acpi::mcfg::Mcfg;

use crate::config::{ECAM_BUS_SIZE, ECAM_FUNCTION_SIZE, ECAM_MAX_REGISTER};

/// Errors from ECAM region management and config space access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EcamError {
    /// A region was described with a zero base address.
    #[error("ECAM region has no base address")]
    InvalidAddress,
    /// A region's end bus is below its start bus.
    #[error("invalid bus range {start_bus:#04x}-{end_bus:#04x}")]
    InvalidBusRange {
        /// First bus.
        start_bus: u8,
        /// Last bus.
        end_bus: u8,
    },
    /// The region's config space would run past the end of the address
    /// space.
    #[error("ECAM region at {base_address:#x} for buses up to {end_bus:#04x} exceeds the address space")]
    AddressOverflow {
        /// Base address as given.
        base_address: u64,
        /// Last bus.
        end_bus: u8,
    },
    /// An injected region overlaps one that is already registered.
    #[error("ECAM region for domain {segment:04x} [bus {start_bus:02x}-{end_bus:02x}] already exists")]
    Conflict {
        /// Segment of the existing region.
        segment: u16,
        /// First bus of the existing region.
        start_bus: u8,
        /// Last bus of the existing region.
        end_bus: u8,
    },
    /// No region has the given segment and bus range.
    #[error("no ECAM region matches")]
    NotFound,
    /// The MCFG lists no regions.
    #[error("MCFG table has no entries")]
    NoEntries,
    /// The register offset lies past the 4 KiB config space.
    #[error("register offset {0:#x} out of range")]
    InvalidRegister(u16),
    /// The access width is not 1, 2 or 4 bytes.
    #[error("unsupported access width {0}")]
    InvalidWidth(usize),
    /// No region covers the bus.
    #[error("no ECAM region for domain {segment:04x} bus {bus:02x}")]
    Unmapped {
        /// Segment.
        segment: u16,
        /// Bus.
        bus: u8,
    },
    /// The region list could not grow.
    #[error("out of memory")]
    OutOfMemory,
}

impl From<TryReserveError> for EcamError {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

/// Width of a config space access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessWidth {
    /// 8 bits.
    Byte,
    /// 16 bits.
    Word,
    /// 32 bits.
    Dword,
}

impl TryFrom<usize> for AccessWidth {
    type Error = EcamError;

    fn try_from(len: usize) -> Result<Self, Self::Error> {
        match len {
            1 => Ok(Self::Byte),
            2 => Ok(Self::Word),
            4 => Ok(Self::Dword),
            _ => Err(EcamError::InvalidWidth(len)),
        }
    }
}

/// Performs the actual config space loads and stores.
///
/// Implementations map `phys` and issue a volatile access of the given
/// width. Sub-dword reads are zero-extended; sub-dword writes use the low
/// bits of `value`.
pub trait ConfigSpaceMmio {
    /// Reads `width` bytes at physical address `phys`.
    fn read(&self, phys: u64, width: AccessWidth) -> u32;

    /// Writes the low `width` bytes of `value` at physical address `phys`.
    fn write(&self, phys: u64, width: AccessWidth, value: u32);
}

/// One ECAM window.
///
/// Only built through [`EcamRegion::new`], so every address inside the
/// window fits in a `u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcamRegion {
    segment: u16,
    start_bus: u8,
    end_bus: u8,
    base_address: u64,
}

impl EcamRegion {
    /// Creates a region.
    ///
    /// # Errors
    ///
    /// - [`EcamError::InvalidAddress`] for a zero base.
    /// - [`EcamError::InvalidBusRange`] if `end_bus < start_bus`.
    /// - [`EcamError::AddressOverflow`] if the config space of `end_bus`
    ///   does not fit below `u64::MAX`.
    pub fn new(segment: u16, start_bus: u8, end_bus: u8, base_address: u64) -> Result<Self, EcamError> {
        if base_address == 0 {
            return Err(EcamError::InvalidAddress);
        }
        if end_bus < start_bus {
            return Err(EcamError::InvalidBusRange { start_bus, end_bus });
        }
        base_address
            .checked_add((u64::from(end_bus) + 1) * ECAM_BUS_SIZE - 1)
            .ok_or(EcamError::AddressOverflow { base_address, end_bus })?;
        Ok(Self {
            segment,
            start_bus,
            end_bus,
            base_address,
        })
    }

    /// PCI segment group.
    #[must_use]
    pub fn segment(&self) -> u16 {
        self.segment
    }

    /// First bus decoded by the window.
    #[must_use]
    pub fn start_bus(&self) -> u8 {
        self.start_bus
    }

    /// Last bus decoded by the window.
    #[must_use]
    pub fn end_bus(&self) -> u8 {
        self.end_bus
    }

    /// Address of bus 0's config space.
    #[must_use]
    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    /// Returns `true` if the region decodes `bus` of `segment`.
    #[must_use]
    pub fn contains(&self, segment: u16, bus: u8) -> bool {
        self.segment == segment && (self.start_bus..=self.end_bus).contains(&bus)
    }

    /// First byte of config space the region decodes.
    #[must_use]
    pub fn start(&self) -> u64 {
        self.base_address + u64::from(self.start_bus) * ECAM_BUS_SIZE
    }

    /// Number of bytes the region decodes.
    #[must_use]
    pub fn size(&self) -> u64 {
        (u64::from(self.end_bus) - u64::from(self.start_bus) + 1) * ECAM_BUS_SIZE
    }

    /// Last byte of config space the region decodes.
    #[must_use]
    pub fn last_address(&self) -> u64 {
        self.start() + (self.size() - 1)
    }

    /// Physical address of register `reg` of function `devfn` on `bus`.
    ///
    /// Returns `None` if the region does not decode `bus` or `reg` lies
    /// past the function's config space.
    #[must_use]
    pub fn config_address(&self, bus: u8, devfn: u8, reg: u16) -> Option<u64> {
        if !(self.start_bus..=self.end_bus).contains(&bus) || reg > ECAM_MAX_REGISTER {
            return None;
        }
        Some(
            self.base_address
                + u64::from(bus) * ECAM_BUS_SIZE
                + u64::from(devfn) * ECAM_FUNCTION_SIZE
                + u64::from(reg),
        )
    }

    fn sort_key(&self) -> (u16, u8) {
        (self.segment, self.start_bus)
    }
}

/// The set of ECAM windows known to the system.
pub struct EcamRegistry {
    regions: RwLock<Vec<EcamRegion>>,
}

impl EcamRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regions: RwLock::new(Vec::new()),
        }
    }

    /// Builds a registry from the MCFG allocation entries.
    ///
    /// # Errors
    ///
    /// Returns [`EcamError::NoEntries`] for an empty MCFG, and any error of
    /// [`EcamRegistry::add`]. On error no region is kept.
    pub fn from_mcfg(mcfg: &Mcfg<'_>) -> Result<Self, EcamError> {
        if mcfg.entry_count() == 0 {
            log::error!("PCI: MCFG table has no entries");
            return Err(EcamError::NoEntries);
        }
        let registry = Self::new();
        for entry in mcfg.entries() {
            registry.add(entry.segment_group, entry.start_bus, entry.end_bus, entry.base_address)?;
        }
        Ok(registry)
    }

    /// Adds a region without checking for overlap.
    ///
    /// # Errors
    ///
    /// Any error of [`EcamRegion::new`], or [`EcamError::OutOfMemory`].
    pub fn add(&self, segment: u16, start_bus: u8, end_bus: u8, base_address: u64) -> Result<EcamRegion, EcamError> {
        let region = EcamRegion::new(segment, start_bus, end_bus, base_address)?;
        insert_sorted(&mut self.regions.write(), region)?;
        log::info!(
            "PCI: MMCONFIG for domain {:04x} [bus {:02x}-{:02x}] at {:#x}-{:#x} (base {:#x})",
            segment,
            start_bus,
            end_bus,
            region.start(),
            region.last_address(),
            base_address
        );
        Ok(region)
    }

    /// Adds a region for a hot-plugged host bridge.
    ///
    /// # Errors
    ///
    /// Returns [`EcamError::Conflict`] if a registered region already
    /// decodes `region`'s start bus.
    pub fn inject(&self, region: EcamRegion) -> Result<(), EcamError> {
        let mut regions = self.regions.write();
        if let Some(existing) = regions
            .iter()
            .find(|r| r.contains(region.segment, region.start_bus))
        {
            if existing.end_bus < region.end_bus {
                log::info!(
                    "PCI: MMCONFIG for domain {:04x} [bus {:02x}-{:02x}] only partially covers this bridge",
                    existing.segment,
                    existing.start_bus,
                    existing.end_bus
                );
            }
            return Err(EcamError::Conflict {
                segment: existing.segment,
                start_bus: existing.start_bus,
                end_bus: existing.end_bus,
            });
        }
        insert_sorted(&mut regions, region)?;
        log::info!(
            "PCI: MMCONFIG at {:#x}-{:#x} (base {:#x})",
            region.start(),
            region.last_address(),
            region.base_address
        );
        Ok(())
    }

    /// Removes the region with exactly this segment and bus range.
    ///
    /// # Errors
    ///
    /// Returns [`EcamError::NotFound`] if there is none.
    pub fn delete(&self, segment: u16, start_bus: u8, end_bus: u8) -> Result<EcamRegion, EcamError> {
        let mut regions = self.regions.write();
        let position = regions
            .iter()
            .position(|r| r.segment == segment && r.start_bus == start_bus && r.end_bus == end_bus)
            .ok_or(EcamError::NotFound)?;
        Ok(regions.remove(position))
    }

    /// Returns the region decoding `bus` of `segment`.
    #[must_use]
    pub fn lookup(&self, segment: u16, bus: u8) -> Option<EcamRegion> {
        self.regions
            .read()
            .iter()
            .find(|r| r.contains(segment, bus))
            .copied()
    }

    /// Snapshot of all regions, in sorted order.
    ///
    /// # Errors
    ///
    /// Returns [`EcamError::OutOfMemory`] if the copy cannot be allocated.
    pub fn regions(&self) -> Result<Vec<EcamRegion>, EcamError> {
        let regions = self.regions.read();
        let mut copy = Vec::new();
        copy.try_reserve_exact(regions.len())?;
        copy.extend_from_slice(&regions);
        Ok(copy)
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.read().len()
    }

    /// Returns `true` if no region is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn address(&self, segment: u16, bus: u8, devfn: u8, reg: u16) -> Result<u64, EcamError> {
        if reg > ECAM_MAX_REGISTER {
            return Err(EcamError::InvalidRegister(reg));
        }
        self.lookup(segment, bus)
            .and_then(|region| region.config_address(bus, devfn, reg))
            .ok_or(EcamError::Unmapped { segment, bus })
    }

    /// Reads `len` bytes of config space.
    ///
    /// # Errors
    ///
    /// - [`EcamError::InvalidRegister`] if `reg` is past 4095.
    /// - [`EcamError::InvalidWidth`] unless `len` is 1, 2 or 4.
    /// - [`EcamError::Unmapped`] if no region covers the bus.
    pub fn read(
        &self,
        mmio: &impl ConfigSpaceMmio,
        segment: u16,
        bus: u8,
        devfn: u8,
        reg: u16,
        len: usize,
    ) -> Result<u32, EcamError> {
        let width = AccessWidth::try_from(len)?;
        let phys = self.address(segment, bus, devfn, reg)?;
        Ok(mmio.read(phys, width))
    }

    /// Writes the low `len` bytes of `value` to config space.
    ///
    /// # Errors
    ///
    /// See [`EcamRegistry::read`].
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &self,
        mmio: &impl ConfigSpaceMmio,
        segment: u16,
        bus: u8,
        devfn: u8,
        reg: u16,
        len: usize,
        value: u32,
    ) -> Result<(), EcamError> {
        let width = AccessWidth::try_from(len)?;
        let phys = self.address(segment, bus, devfn, reg)?;
        mmio.write(phys, width, value);
        Ok(())
    }
}

impl Default for EcamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_sorted(regions: &mut Vec<EcamRegion>, region: EcamRegion) -> Result<(), EcamError> {
    regions.try_reserve(1)?;
    let at = regions.partition_point(|r| r.sort_key() < region.sort_key());
    regions.insert(at, region);
    Ok(())
}
