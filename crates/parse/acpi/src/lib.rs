//! `trellis-acpi` --- a standalone, `no_std` ACPI table parser for ARM platforms.
//!
//! This crate parses the ACPI tables a kernel needs to discover its
//! interrupt and I/O translation topology during early boot: RSDP,
//! RSDT/XSDT, MADT (GIC subtables), MCFG and IORT.
//!
//! Nothing here allocates. Every table is a borrowed byte slice, obtained
//! either from an [`AcpiHandler`] that maps physical memory on demand or, for
//! already-mapped images, directly through `from_bytes` constructors. All
//! iteration is bounds-checked against the table's declared length, so a
//! hostile or truncated table yields [`AcpiError`] values rather than
//! out-of-bounds reads.
//!
//! # Usage
//!
//! ```ignore
//! let tables = AcpiTables::new(rsdp_physical_address, my_handler)?;
//! let iort = tables.iort()?;
//! for node in iort.nodes() {
//!     let node = node?;
//!     // ...
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

#[cfg(test)]
extern crate alloc;

pub mod iort;
pub mod madt;
pub mod mcfg;
pub mod rsdp;
pub mod rsdt;
pub mod sdt;

#[cfg(test)]
mod test_util;

// Re-export key types at crate root for convenience.
pub use iort::{
    IdMapping, IdMappingFlags, IdMappings, Iort, IortNode, IortNodeIter, IortNodeKind, IortNodeType,
    ItsIdentifiers,
};
pub use madt::{
    GicCpuInterface, GicDistributor, GicMsiFrame, GicRedistributor, GicTranslator, Madt,
    MadtEntry, MadtEntryIter,
};
pub use mcfg::{Mcfg, McfgEntry, McfgEntryIter};
pub use sdt::{SdtHeader, ValidatedTable};

/// Errors that can occur during ACPI table parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AcpiError {
    /// The checksum of a table or the RSDP did not validate (sum != 0).
    #[error("checksum mismatch")]
    InvalidChecksum,
    /// The table signature did not match the expected value.
    #[error("unexpected table signature")]
    InvalidSignature,
    /// The RSDP revision field contained an unrecognised value.
    #[error("unrecognised RSDP revision")]
    InvalidRevision,
    /// A table with the requested signature was not found in the RSDT/XSDT.
    #[error("table not found")]
    TableNotFound,
    /// The RSDP structure was invalid (bad signature or checksum).
    #[error("invalid RSDP")]
    InvalidRsdp,
    /// A table or structure was too short to contain the expected data.
    #[error("table truncated")]
    TruncatedData,
    /// A structure inside the table points or extends outside its bounds.
    ///
    /// `offset` is the byte offset, from the start of the table, of the
    /// structure that failed validation.
    #[error("corrupt table structure at offset {offset:#x}")]
    CorruptTable {
        /// Offset of the offending structure from the table start.
        offset: usize,
    },
}

/// Trait for mapping physical memory regions so ACPI tables can be read.
///
/// An implementation must return a byte slice covering at least `size` bytes
/// starting at physical address `phys`. The mapping may be an identity map, a
/// linear map offset, or a permanent fixmap --- the crate does not care.
///
/// # Safety
///
/// Implementors must ensure that the returned slice is valid and readable for
/// the requested `size` bytes. The mapping must remain valid for `'static`.
pub unsafe trait AcpiHandler {
    /// Map a physical memory region and return a byte slice over it.
    ///
    /// # Safety
    ///
    /// The caller guarantees that `phys` is a valid ACPI-related physical
    /// address and `size` does not extend beyond the actual table.
    unsafe fn map_physical_region(&self, phys: u64, size: usize) -> &'static [u8];
}

/// Collection of ACPI tables discovered via the RSDP.
///
/// Construct it with [`AcpiTables::new`] from the physical address of the
/// RSDP and an [`AcpiHandler`], then request individual tables. Tables are
/// located and validated lazily, each time they are requested.
pub struct AcpiTables<H: AcpiHandler> {
    /// Handler used to map physical memory.
    handler: H,
    /// Physical address of the RSDT or XSDT.
    rsdt_addr: u64,
    /// `true` if `rsdt_addr` points to an XSDT, `false` for RSDT.
    is_xsdt: bool,
}

impl<H: AcpiHandler> AcpiTables<H> {
    /// Validate the RSDP at `rsdp_phys` and record the root table address.
    ///
    /// # Errors
    ///
    /// Returns an [`AcpiError`] if the RSDP is invalid.
    pub fn new(rsdp_phys: u64, handler: H) -> Result<Self, AcpiError> {
        let (rsdt_addr, is_xsdt) = rsdp::parse_rsdp(&handler, rsdp_phys)?;
        Ok(Self {
            handler,
            rsdt_addr,
            is_xsdt,
        })
    }

    /// Search the RSDT/XSDT for a table with the given 4-byte signature.
    ///
    /// Returns the physical address of the table if found, or `None`.
    #[must_use]
    pub fn find_table(&self, signature: &[u8; 4]) -> Option<u64> {
        rsdt::find_table_in_rsdt(&self.handler, self.rsdt_addr, self.is_xsdt, signature)
    }

    /// Parse and return the MADT (Multiple APIC Description Table).
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::TableNotFound`] if no MADT exists, or another
    /// [`AcpiError`] variant if the table is malformed.
    pub fn madt(&self) -> Result<Madt<'static>, AcpiError> {
        let phys = self
            .find_table(madt::MADT_SIGNATURE)
            .ok_or(AcpiError::TableNotFound)?;
        Madt::parse(&self.handler, phys)
    }

    /// Parse and return the MCFG (PCI Express ECAM) table.
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::TableNotFound`] if no MCFG table exists, or
    /// another [`AcpiError`] variant if the table is malformed.
    pub fn mcfg(&self) -> Result<Mcfg<'static>, AcpiError> {
        let phys = self
            .find_table(mcfg::MCFG_SIGNATURE)
            .ok_or(AcpiError::TableNotFound)?;
        Mcfg::parse(&self.handler, phys)
    }

    /// Parse and return the IORT (I/O Remapping Table).
    ///
    /// Only the table header is validated here; node-level validation
    /// happens while iterating [`Iort::nodes`].
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::TableNotFound`] if no IORT exists, or another
    /// [`AcpiError`] variant if the header is malformed.
    pub fn iort(&self) -> Result<Iort<'static>, AcpiError> {
        let phys = self
            .find_table(iort::IORT_SIGNATURE)
            .ok_or(AcpiError::TableNotFound)?;
        Iort::parse(&self.handler, phys)
    }

    /// Returns a reference to the underlying [`AcpiHandler`].
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Returns the physical address of the RSDT or XSDT.
    #[must_use]
    pub fn rsdt_addr(&self) -> u64 {
        self.rsdt_addr
    }

    /// Returns whether the root table is an XSDT (`true`) or RSDT (`false`).
    #[must_use]
    pub fn is_xsdt(&self) -> bool {
        self.is_xsdt
    }
}
