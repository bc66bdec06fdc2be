//! PCI Express Memory-Mapped Configuration (MCFG) table parsing.
//!
//! The MCFG table describes the PCI Express Enhanced Configuration Access
//! Mechanism (ECAM) base addresses for each PCI segment group.

use trellis_binparse::FromBytes;

use crate::sdt::{SdtHeader, validate_table};
use crate::{AcpiError, AcpiHandler};

/// MCFG table signature.
pub const MCFG_SIGNATURE: &[u8; 4] = b"MCFG";

/// A single MCFG configuration space entry.
///
/// Each entry describes the ECAM base address for a PCI segment group and
/// the range of bus numbers it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes)]
#[repr(C, packed)]
pub struct McfgEntry {
    /// Base physical address of the enhanced configuration mechanism.
    pub base_address: u64,
    /// PCI segment group number.
    pub segment_group: u16,
    /// Start PCI bus number decoded by this entry.
    pub start_bus: u8,
    /// End PCI bus number decoded by this entry.
    pub end_bus: u8,
    /// Reserved.
    pub reserved: u32,
}

impl McfgEntry {
    /// Size of a single MCFG entry in bytes.
    pub const SIZE: usize = 16;
}

/// Parsed MCFG table.
pub struct Mcfg<'a> {
    /// Bytes of the entry array. Any trailing partial entry is ignored.
    entries_data: &'a [u8],
}

impl Mcfg<'static> {
    /// Parse an MCFG table from the given physical address.
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::InvalidSignature`] if the table signature is not
    /// `MCFG`, or [`AcpiError::InvalidChecksum`] if the checksum is invalid.
    pub fn parse(handler: &impl AcpiHandler, phys: u64) -> Result<Self, AcpiError> {
        let table = crate::sdt::load_table(handler, phys, MCFG_SIGNATURE)?;
        Ok(Self::from_validated(table.data))
    }
}

impl<'a> Mcfg<'a> {
    /// Size of the reserved field between the SDT header and the entries.
    const RESERVED_SIZE: usize = 8;

    /// Parse an MCFG table from an already-mapped image.
    ///
    /// # Errors
    ///
    /// See [`Mcfg::parse`].
    pub fn from_bytes(data: &'a [u8]) -> Result<Self, AcpiError> {
        let table = validate_table(data, MCFG_SIGNATURE)?;
        Ok(Self::from_validated(table.data))
    }

    fn from_validated(data: &'a [u8]) -> Self {
        let entries_offset = SdtHeader::SIZE + Self::RESERVED_SIZE;
        Self {
            entries_data: data.get(entries_offset..).unwrap_or(&[]),
        }
    }

    /// Returns an iterator over the MCFG configuration space entries.
    #[must_use]
    pub fn entries(&self) -> McfgEntryIter<'a> {
        McfgEntryIter {
            data: self.entries_data,
            offset: 0,
        }
    }

    /// Returns the number of MCFG entries.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries_data.len() / McfgEntry::SIZE
    }
}

/// Iterator over MCFG configuration space entries.
pub struct McfgEntryIter<'a> {
    data: &'a [u8],
    offset: usize,
}

impl Iterator for McfgEntryIter<'_> {
    type Item = McfgEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = McfgEntry::read_at(self.data, self.offset)?;
        self.offset += McfgEntry::SIZE;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.data.len().saturating_sub(self.offset) / McfgEntry::SIZE;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for McfgEntryIter<'_> {}
