//! System Description Table (SDT) header and checksum utilities.

use trellis_binparse::FromBytes;

use crate::{AcpiError, AcpiHandler};

/// Standard ACPI System Description Table header.
///
/// This 36-byte header is present at the start of every ACPI table
/// (RSDT, XSDT, MADT, MCFG, IORT, etc.).
#[derive(Debug, Clone, Copy, FromBytes)]
#[repr(C, packed)]
pub struct SdtHeader {
    /// 4-byte ASCII signature identifying the table type.
    pub signature: [u8; 4],
    /// Total length of the table, including the header, in bytes.
    pub length: u32,
    /// Revision of the table structure.
    pub revision: u8,
    /// Checksum byte. The entire table, including the header, must sum to zero.
    pub checksum: u8,
    /// OEM-supplied identification string.
    pub oem_id: [u8; 6],
    /// OEM-supplied table identification string.
    pub oem_table_id: [u8; 8],
    /// OEM-supplied revision number.
    pub oem_revision: u32,
    /// Vendor ID of the utility that created the table.
    pub creator_id: u32,
    /// Revision of the utility that created the table.
    pub creator_revision: u32,
}

impl SdtHeader {
    /// The size of an SDT header in bytes.
    pub const SIZE: usize = 36;

    /// Returns the 4-byte signature.
    #[must_use]
    pub fn signature(&self) -> [u8; 4] {
        self.signature
    }

    /// Returns the total length of this table (header included).
    #[must_use]
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Returns the table revision.
    #[must_use]
    pub fn revision(&self) -> u8 {
        self.revision
    }
}

/// Table bytes with a validated header.
///
/// `data` is trimmed to exactly the length the header declares, so parsers
/// built on top never see bytes beyond the table.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedTable<'a> {
    /// The validated SDT header.
    pub header: SdtHeader,
    /// The full table data (including header), checksum-validated.
    pub data: &'a [u8],
}

/// Maps and validates an ACPI table at the given physical address.
///
/// 1. Map the SDT header to learn the table length.
/// 2. Verify the signature matches `expected_signature`.
/// 3. Map the full table.
/// 4. Hand the bytes to [`validate_table`].
///
/// # Errors
///
/// Returns [`AcpiError::TruncatedData`] if the header cannot be read or the
/// declared length is shorter than a header, [`AcpiError::InvalidSignature`]
/// if the signature doesn't match, or [`AcpiError::InvalidChecksum`] if the
/// checksum fails.
pub fn load_table(
    handler: &impl AcpiHandler,
    phys: u64,
    expected_signature: &[u8; 4],
) -> Result<ValidatedTable<'static>, AcpiError> {
    // SAFETY: Caller provides a valid table physical address.
    let header_data = unsafe { handler.map_physical_region(phys, SdtHeader::SIZE) };
    let header = SdtHeader::read_from(header_data).ok_or(AcpiError::TruncatedData)?;

    if &header.signature() != expected_signature {
        return Err(AcpiError::InvalidSignature);
    }

    let total_len = header.length() as usize;
    if total_len < SdtHeader::SIZE {
        return Err(AcpiError::TruncatedData);
    }

    // SAFETY: phys is valid, total_len comes from the header.
    let data = unsafe { handler.map_physical_region(phys, total_len) };
    validate_table(data, expected_signature)
}

/// Validates an already-mapped table image.
///
/// `data` may be longer than the table; the returned slice is cut to the
/// header's `length` field.
///
/// # Errors
///
/// Same as [`load_table`]. A slice shorter than the declared length is
/// [`AcpiError::TruncatedData`].
pub fn validate_table<'a>(
    data: &'a [u8],
    expected_signature: &[u8; 4],
) -> Result<ValidatedTable<'a>, AcpiError> {
    let header = SdtHeader::read_from(data).ok_or(AcpiError::TruncatedData)?;

    if &header.signature() != expected_signature {
        return Err(AcpiError::InvalidSignature);
    }

    let total_len = header.length() as usize;
    if total_len < SdtHeader::SIZE {
        return Err(AcpiError::TruncatedData);
    }
    let data = data.get(..total_len).ok_or(AcpiError::TruncatedData)?;

    if !validate_checksum(data) {
        return Err(AcpiError::InvalidChecksum);
    }

    Ok(ValidatedTable { header, data })
}

/// Validate the checksum of a byte slice.
///
/// ACPI tables are designed so that the sum of all bytes in the table equals
/// zero (mod 256).
#[must_use]
pub fn validate_checksum(data: &[u8]) -> bool {
    data.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte)) == 0
}
