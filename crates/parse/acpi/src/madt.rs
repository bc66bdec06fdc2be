//! Multiple APIC Description Table (MADT) parsing, GIC subset.
//!
//! On ARM the MADT describes the Generic Interrupt Controller: one GIC CPU
//! interface per processor, the distributor, optional GICv2m MSI frames,
//! redistributor discovery ranges and ITS translators. Entry headers use
//! `u8` type and `u8` length fields.

use bitflags::bitflags;
use trellis_binparse::FromBytes;

use crate::sdt::{SdtHeader, validate_table};
use crate::{AcpiError, AcpiHandler};

/// MADT table signature (`b"APIC"`).
pub const MADT_SIGNATURE: &[u8; 4] = b"APIC";

/// Raw MADT header fields that follow the SDT header.
#[derive(Debug, Clone, Copy, FromBytes)]
#[repr(C, packed)]
struct MadtHeaderFields {
    /// Local interrupt controller address (unused on ARM).
    local_interrupt_controller_address: u32,
    /// MADT flags.
    flags: u32,
}

/// Parsed MADT table.
pub struct Madt<'a> {
    /// Local interrupt controller address. Always zero on GIC systems.
    pub local_interrupt_controller_address: u32,
    /// MADT flags (bit 0: `PCAT_COMPAT`).
    pub flags: u32,
    /// Byte slice covering the entry data.
    entries_data: &'a [u8],
}

impl Madt<'static> {
    /// Parse a MADT from the given physical address.
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::InvalidChecksum`] if the table checksum is invalid,
    /// or [`AcpiError::InvalidSignature`] if the table signature is not `APIC`.
    pub fn parse(handler: &impl AcpiHandler, phys: u64) -> Result<Self, AcpiError> {
        let table = crate::sdt::load_table(handler, phys, MADT_SIGNATURE)?;
        Self::from_validated(table.data)
    }
}

impl<'a> Madt<'a> {
    /// Size of the fixed MADT fields after the SDT header.
    const FIELDS_SIZE: usize = 8;

    /// Parse a MADT from an already-mapped table image.
    ///
    /// # Errors
    ///
    /// See [`Madt::parse`].
    pub fn from_bytes(data: &'a [u8]) -> Result<Self, AcpiError> {
        let table = validate_table(data, MADT_SIGNATURE)?;
        Self::from_validated(table.data)
    }

    fn from_validated(data: &'a [u8]) -> Result<Self, AcpiError> {
        let fields =
            MadtHeaderFields::read_at(data, SdtHeader::SIZE).ok_or(AcpiError::TruncatedData)?;

        let entries_offset = SdtHeader::SIZE + Self::FIELDS_SIZE;
        let entries_data = data.get(entries_offset..).unwrap_or(&[]);

        Ok(Self {
            local_interrupt_controller_address: fields.local_interrupt_controller_address,
            flags: fields.flags,
            entries_data,
        })
    }

    /// Returns an iterator over the MADT interrupt controller entries.
    ///
    /// Iteration stops at the first entry whose length field is too small to
    /// cover its header or runs past the end of the table.
    #[must_use]
    pub fn entries(&self) -> MadtEntryIter<'a> {
        MadtEntryIter {
            data: self.entries_data,
            offset: 0,
        }
    }
}

bitflags! {
    /// GIC CPU interface flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GiccFlags: u32 {
        /// The processor is ready for use.
        const ENABLED = 1 << 0;
        /// Performance interrupt is edge-triggered.
        const PERFORMANCE_INTERRUPT_EDGE = 1 << 1;
        /// VGIC maintenance interrupt is edge-triggered.
        const VGIC_MAINTENANCE_EDGE = 1 << 2;
        /// The processor can be brought online later.
        const ONLINE_CAPABLE = 1 << 3;
    }
}

bitflags! {
    /// GIC MSI frame flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MsiFrameFlags: u32 {
        /// `spi_count` and `spi_base` override the frame's `MSI_TYPER` register.
        const SPI_COUNT_BASE_SELECT = 1 << 0;
    }
}

/// Type 0x0B: GIC CPU interface (GICC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GicCpuInterface {
    /// GIC CPU interface number.
    pub cpu_interface_number: u32,
    /// ACPI processor UID.
    pub acpi_processor_uid: u32,
    /// Interface flags.
    pub flags: GiccFlags,
    /// Version of the ARM parking protocol.
    pub parking_protocol_version: u32,
    /// GSIV of the performance monitoring interrupt.
    pub performance_interrupt_gsiv: u32,
    /// Physical address of the processor's parking protocol mailbox.
    pub parked_address: u64,
    /// GICv2 CPU interface base (zero on GICv3 systems).
    pub physical_base_address: u64,
    /// GIC virtual CPU interface registers.
    pub gicv: u64,
    /// GIC virtual interface control registers.
    pub gich: u64,
    /// GSIV of the virtual GIC maintenance interrupt.
    pub vgic_maintenance_interrupt: u32,
    /// Per-CPU redistributor base, when not described by a GICR entry.
    pub gicr_base_address: u64,
    /// MPIDR affinity of the processor.
    pub mpidr: u64,
}

/// Type 0x0C: GIC distributor (GICD).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GicDistributor {
    /// GIC hardware ID.
    pub gic_id: u32,
    /// Physical base address of the distributor.
    pub physical_base_address: u64,
    /// Global system interrupt base (reserved, always zero).
    pub system_vector_base: u32,
    /// Declared GIC version; zero means "detect from hardware".
    pub gic_version: u8,
}

/// Type 0x0D: GICv2m MSI frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GicMsiFrame {
    /// MSI frame ID.
    pub msi_frame_id: u32,
    /// Physical base address of the frame.
    pub physical_base_address: u64,
    /// Frame flags.
    pub flags: MsiFrameFlags,
    /// Number of SPIs served by the frame.
    pub spi_count: u16,
    /// First SPI served by the frame.
    pub spi_base: u16,
}

/// Type 0x0E: GIC redistributor discovery range (GICR).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GicRedistributor {
    /// Base address of the discovery range.
    pub discovery_range_base_address: u64,
    /// Length of the discovery range.
    pub discovery_range_length: u32,
}

/// Type 0x0F: GIC interrupt translation service (ITS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GicTranslator {
    /// Unique translation ID, matched against IORT ITS group identifiers.
    pub translation_id: u32,
    /// Physical base address of the ITS.
    pub physical_base_address: u64,
}

/// A single MADT interrupt controller structure entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MadtEntry {
    /// Type 0x0B.
    GicCpuInterface(GicCpuInterface),
    /// Type 0x0C.
    GicDistributor(GicDistributor),
    /// Type 0x0D.
    GicMsiFrame(GicMsiFrame),
    /// Type 0x0E.
    GicRedistributor(GicRedistributor),
    /// Type 0x0F.
    GicTranslator(GicTranslator),
    /// A known GIC entry type whose length is below its minimum.
    Malformed {
        /// The entry type byte.
        entry_type: u8,
        /// The entry length including the 2-byte header.
        length: u8,
    },
    /// An entry type that we do not parse.
    Unknown {
        /// The entry type byte.
        entry_type: u8,
        /// The entry length including the 2-byte header.
        length: u8,
    },
}

impl MadtEntry {
    /// Entry type codes.
    pub const GICC: u8 = 0x0B;
    /// See [`MadtEntry::GICC`].
    pub const GICD: u8 = 0x0C;
    /// See [`MadtEntry::GICC`].
    pub const GIC_MSI_FRAME: u8 = 0x0D;
    /// See [`MadtEntry::GICC`].
    pub const GICR: u8 = 0x0E;
    /// See [`MadtEntry::GICC`].
    pub const GIC_ITS: u8 = 0x0F;

    /// Minimum length for a known type, `None` for unknown types.
    fn min_length(entry_type: u8) -> Option<usize> {
        match entry_type {
            Self::GICC => Some(76),
            Self::GICD | Self::GIC_MSI_FRAME => Some(24),
            Self::GICR => Some(16),
            Self::GIC_ITS => Some(20),
            _ => None,
        }
    }

    /// Decodes one entry. `data` covers exactly `length` bytes.
    fn decode(entry_type: u8, length: u8, data: &[u8]) -> Option<Self> {
        let Some(min) = Self::min_length(entry_type) else {
            return Some(Self::Unknown { entry_type, length });
        };
        if data.len() < min {
            return Some(Self::Malformed { entry_type, length });
        }

        Some(match entry_type {
            Self::GICC => Self::GicCpuInterface(GicCpuInterface {
                cpu_interface_number: u32::read_at(data, 4)?,
                acpi_processor_uid: u32::read_at(data, 8)?,
                flags: GiccFlags::from_bits_retain(u32::read_at(data, 12)?),
                parking_protocol_version: u32::read_at(data, 16)?,
                performance_interrupt_gsiv: u32::read_at(data, 20)?,
                parked_address: u64::read_at(data, 24)?,
                physical_base_address: u64::read_at(data, 32)?,
                gicv: u64::read_at(data, 40)?,
                gich: u64::read_at(data, 48)?,
                vgic_maintenance_interrupt: u32::read_at(data, 56)?,
                gicr_base_address: u64::read_at(data, 60)?,
                mpidr: u64::read_at(data, 68)?,
            }),
            Self::GICD => Self::GicDistributor(GicDistributor {
                gic_id: u32::read_at(data, 4)?,
                physical_base_address: u64::read_at(data, 8)?,
                system_vector_base: u32::read_at(data, 16)?,
                gic_version: u8::read_at(data, 20)?,
            }),
            Self::GIC_MSI_FRAME => Self::GicMsiFrame(GicMsiFrame {
                msi_frame_id: u32::read_at(data, 4)?,
                physical_base_address: u64::read_at(data, 8)?,
                flags: MsiFrameFlags::from_bits_retain(u32::read_at(data, 16)?),
                spi_count: u16::read_at(data, 20)?,
                spi_base: u16::read_at(data, 22)?,
            }),
            Self::GICR => Self::GicRedistributor(GicRedistributor {
                discovery_range_base_address: u64::read_at(data, 4)?,
                discovery_range_length: u32::read_at(data, 12)?,
            }),
            Self::GIC_ITS => Self::GicTranslator(GicTranslator {
                translation_id: u32::read_at(data, 4)?,
                physical_base_address: u64::read_at(data, 8)?,
            }),
            _ => Self::Unknown { entry_type, length },
        })
    }
}

/// Iterator over MADT interrupt controller entries.
pub struct MadtEntryIter<'a> {
    data: &'a [u8],
    offset: usize,
}

impl Iterator for MadtEntryIter<'_> {
    type Item = MadtEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let entry_type = u8::read_at(self.data, self.offset)?;
        let length = u8::read_at(self.data, self.offset + 1)?;
        let length_usize = usize::from(length);

        if length_usize < 2 {
            self.offset = self.data.len();
            return None;
        }
        let Some(entry_data) = self.data.get(self.offset..self.offset + length_usize) else {
            self.offset = self.data.len();
            return None;
        };
        self.offset += length_usize;

        MadtEntry::decode(entry_type, length, entry_data)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::test_util::TableBuilder;

    fn gicd(version: u8) -> Vec<u8> {
        let mut e = Vec::new();
        e.extend_from_slice(&[MadtEntry::GICD, 24, 0, 0]);
        e.extend_from_slice(&0u32.to_le_bytes());
        e.extend_from_slice(&0x0800_0000u64.to_le_bytes());
        e.extend_from_slice(&0u32.to_le_bytes());
        e.push(version);
        e.extend_from_slice(&[0; 3]);
        e
    }

    fn its(id: u32, base: u64) -> Vec<u8> {
        let mut e = Vec::new();
        e.extend_from_slice(&[MadtEntry::GIC_ITS, 20, 0, 0]);
        e.extend_from_slice(&id.to_le_bytes());
        e.extend_from_slice(&base.to_le_bytes());
        e.extend_from_slice(&0u32.to_le_bytes());
        e
    }

    fn gicc(uid: u32, mpidr: u64) -> Vec<u8> {
        let mut e = alloc::vec![0u8; 80];
        e[0] = MadtEntry::GICC;
        e[1] = 80;
        e[8..12].copy_from_slice(&uid.to_le_bytes());
        e[12..16].copy_from_slice(&1u32.to_le_bytes());
        e[60..68].copy_from_slice(&0x080A_0000u64.to_le_bytes());
        e[68..76].copy_from_slice(&mpidr.to_le_bytes());
        e
    }

    fn madt(entries: &[Vec<u8>]) -> Vec<u8> {
        let mut builder = TableBuilder::new(MADT_SIGNATURE).u32(0).u32(0);
        for entry in entries {
            builder = builder.bytes(entry);
        }
        builder.finish()
    }

    #[test]
    fn decodes_gic_entries() {
        let table = madt(&[gicc(3, 0x0000_0100), gicd(3), its(7, 0x0808_0000)]);
        let madt = Madt::from_bytes(&table).unwrap();
        let entries: Vec<MadtEntry> = madt.entries().collect();
        assert_eq!(entries.len(), 3);

        let MadtEntry::GicCpuInterface(cpu) = entries[0] else {
            panic!("expected GICC, got {:?}", entries[0]);
        };
        assert_eq!(cpu.acpi_processor_uid, 3);
        assert_eq!(cpu.mpidr, 0x100);
        assert_eq!(cpu.gicr_base_address, 0x080A_0000);
        assert!(cpu.flags.contains(GiccFlags::ENABLED));

        assert_eq!(
            entries[1],
            MadtEntry::GicDistributor(GicDistributor {
                gic_id: 0,
                physical_base_address: 0x0800_0000,
                system_vector_base: 0,
                gic_version: 3,
            })
        );
        assert_eq!(
            entries[2],
            MadtEntry::GicTranslator(GicTranslator {
                translation_id: 7,
                physical_base_address: 0x0808_0000,
            })
        );
    }

    #[test]
    fn short_known_entry_is_malformed() {
        let mut short = its(1, 0x1000);
        short.truncate(12);
        short[1] = 12;
        let table = madt(&[short, gicd(2)]);
        let madt = Madt::from_bytes(&table).unwrap();
        let entries: Vec<MadtEntry> = madt.entries().collect();
        assert_eq!(
            entries[0],
            MadtEntry::Malformed {
                entry_type: MadtEntry::GIC_ITS,
                length: 12
            }
        );
        assert!(matches!(entries[1], MadtEntry::GicDistributor(_)));
    }

    #[test]
    fn unknown_entries_are_skipped_over() {
        let table = madt(&[alloc::vec![0x00, 8, 0, 0, 0, 0, 0, 0], its(2, 0x2000)]);
        let madt = Madt::from_bytes(&table).unwrap();
        let entries: Vec<MadtEntry> = madt.entries().collect();
        assert_eq!(
            entries[0],
            MadtEntry::Unknown {
                entry_type: 0,
                length: 8
            }
        );
        assert!(matches!(entries[1], MadtEntry::GicTranslator(_)));
    }

    #[test]
    fn iteration_stops_on_zero_length_or_overrun() {
        let table = madt(&[alloc::vec![MadtEntry::GICR, 0, 0, 0]]);
        assert_eq!(Madt::from_bytes(&table).unwrap().entries().count(), 0);

        let table = madt(&[its(1, 0x1000), alloc::vec![MadtEntry::GICR, 40, 0, 0]]);
        assert_eq!(Madt::from_bytes(&table).unwrap().entries().count(), 1);
    }
}
