//! Root System Description Pointer (RSDP) parsing and validation.
//!
//! The RSDP is the entry point into the ACPI table hierarchy. ACPI 1.0
//! defines a 20-byte structure ([`Rsdp`]), while ACPI 2.0+ extends it to
//! 36 bytes ([`Rsdp2`]) with an XSDT address. ARM servers are required to
//! provide the 2.0+ form, but a 1.0 pointer is still accepted.

use trellis_binparse::FromBytes;

use crate::sdt::validate_checksum;
use crate::{AcpiError, AcpiHandler};

/// ACPI 1.0 RSDP --- 20 bytes.
#[derive(Debug, Clone, Copy, FromBytes)]
#[repr(C, packed)]
pub struct Rsdp {
    /// Must be `b"RSD PTR "` (8 bytes, note the trailing space).
    pub signature: [u8; 8],
    /// Checksum covering the first 20 bytes.
    pub checksum: u8,
    /// OEM identification string.
    pub oem_id: [u8; 6],
    /// ACPI revision: 0 for ACPI 1.0, 2 or later for ACPI 2.0+.
    pub revision: u8,
    /// Physical address of the RSDT (32-bit).
    pub rsdt_address: u32,
}

impl Rsdp {
    /// Size of the ACPI 1.0 RSDP structure in bytes.
    pub const SIZE: usize = 20;

    /// Expected signature bytes.
    pub const SIGNATURE: &[u8; 8] = b"RSD PTR ";
}

/// ACPI 2.0+ RSDP extension --- 36 bytes total.
///
/// The first 20 bytes are identical to [`Rsdp`].
#[derive(Debug, Clone, Copy, FromBytes)]
#[repr(C, packed)]
pub struct Rsdp2 {
    /// The ACPI 1.0 portion.
    pub v1: Rsdp,
    /// Total length of this structure (should be 36).
    pub length: u32,
    /// Physical address of the XSDT (64-bit).
    pub xsdt_address: u64,
    /// Checksum covering the entire 36 bytes.
    pub extended_checksum: u8,
    /// Reserved bytes.
    pub reserved: [u8; 3],
}

impl Rsdp2 {
    /// Size of the ACPI 2.0 RSDP structure in bytes.
    pub const SIZE: usize = 36;
}

/// Parse and validate the RSDP at the given physical address.
///
/// Returns `(table_address, is_xsdt)`.
///
/// # Errors
///
/// Returns [`AcpiError::InvalidRsdp`] when the signature is wrong,
/// [`AcpiError::InvalidChecksum`] when either checksum fails, or
/// [`AcpiError::InvalidRevision`] for revision 1, which was never defined.
pub fn parse_rsdp(handler: &impl AcpiHandler, phys: u64) -> Result<(u64, bool), AcpiError> {
    // SAFETY: we trust the handler to return a valid mapping.
    let data = unsafe { handler.map_physical_region(phys, Rsdp2::SIZE) };
    parse_rsdp_bytes(data)
}

/// Slice form of [`parse_rsdp`].
///
/// # Errors
///
/// See [`parse_rsdp`].
pub fn parse_rsdp_bytes(data: &[u8]) -> Result<(u64, bool), AcpiError> {
    let v1 = Rsdp::read_from(data).ok_or(AcpiError::InvalidRsdp)?;

    if &v1.signature != Rsdp::SIGNATURE {
        return Err(AcpiError::InvalidRsdp);
    }
    if !validate_checksum(&data[..Rsdp::SIZE]) {
        return Err(AcpiError::InvalidChecksum);
    }

    match v1.revision {
        0 => Ok((u64::from(v1.rsdt_address), false)),
        1 => Err(AcpiError::InvalidRevision),
        _ => {
            let v2 = Rsdp2::read_from(data).ok_or(AcpiError::TruncatedData)?;
            if !validate_checksum(&data[..Rsdp2::SIZE]) {
                return Err(AcpiError::InvalidChecksum);
            }
            Ok((v2.xsdt_address, true))
        }
    }
}
