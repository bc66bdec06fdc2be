//! RSDT / XSDT table enumeration.
//!
//! The Root System Description Table (RSDT, 32-bit entries) and its 64-bit
//! counterpart (XSDT) contain pointers to all other ACPI tables.

use trellis_binparse::FromBytes;

use crate::AcpiHandler;
use crate::sdt::SdtHeader;

/// Size in bytes of a single table-pointer entry in the RSDT (32-bit).
const RSDT_ENTRY_SIZE: usize = 4;

/// Size in bytes of a single table-pointer entry in the XSDT (64-bit).
const XSDT_ENTRY_SIZE: usize = 8;

/// Iterator over table entry physical addresses in an RSDT or XSDT.
pub struct RsdtIterator<'a> {
    /// Byte slice covering all entries.
    data: &'a [u8],
    /// Current offset (in bytes) from the start of `data`.
    offset: usize,
    /// Size of each entry: 4 for RSDT, 8 for XSDT.
    entry_size: usize,
}

impl<'a> RsdtIterator<'a> {
    /// Create a new iterator over the entries of an RSDT or XSDT.
    ///
    /// `data` covers the entry array only, not the SDT header.
    #[must_use]
    pub fn new(data: &'a [u8], is_xsdt: bool) -> Self {
        Self {
            data,
            offset: 0,
            entry_size: if is_xsdt {
                XSDT_ENTRY_SIZE
            } else {
                RSDT_ENTRY_SIZE
            },
        }
    }
}

impl Iterator for RsdtIterator<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        let addr = if self.entry_size == XSDT_ENTRY_SIZE {
            u64::read_at(self.data, self.offset)?
        } else {
            u64::from(u32::read_at(self.data, self.offset)?)
        };
        self.offset += self.entry_size;
        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.data.len().saturating_sub(self.offset) / self.entry_size;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RsdtIterator<'_> {}

/// Search the RSDT/XSDT for a table whose SDT header matches `signature`.
///
/// Returns the physical address of the first matching table, or `None`.
/// Entries whose header cannot be read are skipped.
pub fn find_table_in_rsdt(
    handler: &impl AcpiHandler,
    rsdt_addr: u64,
    is_xsdt: bool,
    signature: &[u8; 4],
) -> Option<u64> {
    // SAFETY: caller provides a valid physical address.
    let header_data = unsafe { handler.map_physical_region(rsdt_addr, SdtHeader::SIZE) };
    let header = SdtHeader::read_from(header_data)?;

    let total_len = header.length() as usize;
    if total_len <= SdtHeader::SIZE {
        return None;
    }

    // SAFETY: caller provides a valid physical address, total_len is from the header.
    let table_data = unsafe { handler.map_physical_region(rsdt_addr, total_len) };
    let entries_data = table_data.get(SdtHeader::SIZE..)?;

    RsdtIterator::new(entries_data, is_xsdt).find(|&entry_phys| {
        // SAFETY: entry_phys is a physical address from the RSDT/XSDT.
        let candidate_data = unsafe { handler.map_physical_region(entry_phys, SdtHeader::SIZE) };
        SdtHeader::read_from(candidate_data).is_some_and(|c| &c.signature() == signature)
    })
}
