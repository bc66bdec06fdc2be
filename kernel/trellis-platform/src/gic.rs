//! GIC inventory and version detection.
//!
//! The MADT is walked once at boot. Distributor, MSI frame and ITS entries
//! are copied out so later queries do not need the table mapped.

use alloc::collections::TryReserveError;
use alloc::vec::Vec;

use trellis_acpi::madt::{GicDistributor, GicMsiFrame, GicTranslator, Madt, MadtEntry};

use crate::config::GIC_MAX_DECLARED_VERSION;
use crate::error::IortError;
use crate::iort::{DomainToken, DomainTokenRegistry};

/// Offset of `GICD_PIDR2` in a GICv3/v4 distributor frame.
pub const GICD_PIDR2: u64 = 0xFFE8;

/// Size of the GICv3/v4 distributor frame.
pub const GICV3_DIST_MEM_SIZE: u64 = 0x1_0000;

const PIDR2_ARCH_MASK: u32 = 0xF0;
const PIDR2_ARCH_GICV3: u32 = 0x30;

/// Errors from GIC discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GicError {
    /// The MADT has no distributor entry.
    #[error("no valid GIC distributor entry exists")]
    NoDistributor,
    /// The distributor declares a reserved version number.
    #[error("invalid GIC version {0} in MADT")]
    ReservedVersion(u8),
    /// The distributor frame could not be mapped for probing.
    #[error("cannot map GIC distributor at {0:#x}")]
    MapFailed(u64),
    /// An indexed query went past the end of its list.
    #[error("index {index} out of range, count {count}")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of entries.
        count: usize,
    },
    /// The inventory could not be stored.
    #[error("out of memory")]
    OutOfMemory,
}

impl From<TryReserveError> for GicError {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

/// Architecture version of the interrupt controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GicVersion {
    /// GICv1.
    V1,
    /// GICv2.
    V2,
    /// GICv3.
    V3,
    /// GICv4.
    V4,
}

impl GicVersion {
    /// Decodes the MADT distributor version field. `Ok(None)` means the
    /// firmware left it unspecified.
    ///
    /// # Errors
    ///
    /// Returns [`GicError::ReservedVersion`] for values above 4.
    pub fn from_madt(raw: u8) -> Result<Option<Self>, GicError> {
        if raw > GIC_MAX_DECLARED_VERSION {
            return Err(GicError::ReservedVersion(raw));
        }
        match raw {
            0 => Ok(None),
            1 => Ok(Some(Self::V1)),
            2 => Ok(Some(Self::V2)),
            3 => Ok(Some(Self::V3)),
            _ => Ok(Some(Self::V4)),
        }
    }

    /// The version an irqchip driver has to be matched against. GICv4 is
    /// driven by the GICv3 driver.
    #[must_use]
    pub fn driver_version(self) -> Self {
        match self {
            Self::V4 => Self::V3,
            other => other,
        }
    }
}

/// Reads distributor registers during version detection.
pub trait DistributorProbe {
    /// Reads the 32-bit register at `offset` within the
    /// [`GICV3_DIST_MEM_SIZE`]-byte distributor frame based at `base`.
    /// Returns `None` if the frame cannot be mapped.
    fn read_register(&self, base: u64, offset: u64) -> Option<u32>;
}

/// GIC resources described by the MADT.
#[derive(Debug, Clone, Default)]
pub struct GicInventory {
    distributor: Option<GicDistributor>,
    redistributor_count: usize,
    cpu_interface_count: usize,
    msi_frames: Vec<GicMsiFrame>,
    translators: Vec<GicTranslator>,
}

impl GicInventory {
    /// Collects the GIC entries of `madt`.
    ///
    /// Only the first distributor is kept. Entries too short for their type
    /// are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`GicError::OutOfMemory`] if the lists cannot grow.
    pub fn from_madt(madt: &Madt<'_>) -> Result<Self, GicError> {
        let mut inventory = Self::default();
        for entry in madt.entries() {
            match entry {
                MadtEntry::GicCpuInterface(_) => inventory.cpu_interface_count += 1,
                MadtEntry::GicDistributor(gicd) => {
                    if inventory.distributor.is_none() {
                        inventory.distributor = Some(gicd);
                    } else {
                        log::warn!(
                            "GIC: ignoring extra distributor at {:#x}",
                            gicd.physical_base_address
                        );
                    }
                }
                MadtEntry::GicMsiFrame(frame) => {
                    inventory.msi_frames.try_reserve(1)?;
                    inventory.msi_frames.push(frame);
                }
                MadtEntry::GicRedistributor(_) => inventory.redistributor_count += 1,
                MadtEntry::GicTranslator(its) => {
                    inventory.translators.try_reserve(1)?;
                    inventory.translators.push(its);
                }
                MadtEntry::Malformed { entry_type, length } => {
                    log::error!("GIC: malformed MADT entry type {entry_type:#x} length {length}");
                }
                MadtEntry::Unknown { .. } => {}
            }
        }
        log::debug!(
            "GIC: {} CPU interfaces, {} redistributors, {} MSI frames, {} ITS",
            inventory.cpu_interface_count,
            inventory.redistributor_count,
            inventory.msi_frames.len(),
            inventory.translators.len()
        );
        Ok(inventory)
    }

    /// The distributor, if the MADT describes one.
    #[must_use]
    pub fn distributor(&self) -> Option<&GicDistributor> {
        self.distributor.as_ref()
    }

    /// Returns `true` if at least one redistributor range is described.
    #[must_use]
    pub fn has_redistributor(&self) -> bool {
        self.redistributor_count > 0
    }

    /// Number of GIC CPU interface entries.
    #[must_use]
    pub fn cpu_interface_count(&self) -> usize {
        self.cpu_interface_count
    }

    /// All MSI frames in MADT order.
    #[must_use]
    pub fn msi_frames(&self) -> &[GicMsiFrame] {
        &self.msi_frames
    }

    /// All ITS translators in MADT order.
    #[must_use]
    pub fn translators(&self) -> &[GicTranslator] {
        &self.translators
    }

    /// The `index`-th MSI frame.
    ///
    /// # Errors
    ///
    /// Returns [`GicError::IndexOutOfRange`] if `index >= count`.
    pub fn msi_frame(&self, index: usize) -> Result<&GicMsiFrame, GicError> {
        self.msi_frames.get(index).ok_or(GicError::IndexOutOfRange {
            index,
            count: self.msi_frames.len(),
        })
    }

    /// The `index`-th ITS translator.
    ///
    /// # Errors
    ///
    /// Returns [`GicError::IndexOutOfRange`] if `index >= count`.
    pub fn its(&self, index: usize) -> Result<&GicTranslator, GicError> {
        self.translators.get(index).ok_or(GicError::IndexOutOfRange {
            index,
            count: self.translators.len(),
        })
    }

    /// Domain token for MSI allocation on platforms without per-device ITS
    /// routing.
    ///
    /// Only one MSI frame can be associated with devices, so frame 0 is
    /// used; without one, ITS 0 is used. A zero base address counts as
    /// absent.
    #[must_use]
    pub fn msi_token(&self) -> Option<DomainToken> {
        let frame = self
            .msi_frames
            .first()
            .map(|f| f.physical_base_address)
            .filter(|&base| base != 0);
        let its = || {
            self.translators
                .first()
                .map(|t| t.physical_base_address)
                .filter(|&base| base != 0)
        };
        frame.or_else(its).map(DomainToken)
    }

    /// Determines the GIC version.
    ///
    /// The distributor's version field is authoritative. When it is zero the
    /// hardware is asked: a redistributor implies GICv3 or later, told apart
    /// by the architecture field of `GICD_PIDR2`; otherwise GICv2.
    ///
    /// # Errors
    ///
    /// - [`GicError::NoDistributor`] if the MADT has no distributor.
    /// - [`GicError::ReservedVersion`] for a reserved version value.
    /// - [`GicError::MapFailed`] if `probe` cannot reach the distributor.
    pub fn detect_version(&self, probe: &impl DistributorProbe) -> Result<GicVersion, GicError> {
        let gicd = self.distributor.ok_or_else(|| {
            log::error!("GIC: no valid GIC distributor entry exists");
            GicError::NoDistributor
        })?;
        let declared = GicVersion::from_madt(gicd.gic_version).inspect_err(|_| {
            log::error!("GIC: invalid GIC version {} in MADT", gicd.gic_version);
        })?;
        if let Some(version) = declared {
            return Ok(version);
        }

        if !self.has_redistributor() {
            return Ok(GicVersion::V2);
        }
        let base = gicd.physical_base_address;
        let pidr2 = probe
            .read_register(base, GICD_PIDR2)
            .ok_or(GicError::MapFailed(base))?;
        if pidr2 & PIDR2_ARCH_MASK == PIDR2_ARCH_GICV3 {
            Ok(GicVersion::V3)
        } else {
            Ok(GicVersion::V4)
        }
    }

    /// Registers every ITS translator in `registry`, using its base address
    /// as the domain token. Returns the number registered.
    ///
    /// # Errors
    ///
    /// Any error of [`DomainTokenRegistry::register`].
    pub fn register_its_domains(&self, registry: &DomainTokenRegistry) -> Result<usize, IortError> {
        for its in &self.translators {
            registry.register(its.translation_id, DomainToken(its.physical_base_address))?;
        }
        Ok(self.translators.len())
    }
}
