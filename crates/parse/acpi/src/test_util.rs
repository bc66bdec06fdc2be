//! Byte-level builders for synthetic ACPI tables used in unit tests.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::AcpiHandler;
use crate::sdt::SdtHeader;

/// Builds a table image: SDT header followed by appended fields.
///
/// `finish` patches the length and checksum.
pub struct TableBuilder {
    buf: Vec<u8>,
}

impl TableBuilder {
    pub fn new(signature: &[u8; 4]) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(signature);
        buf.extend_from_slice(&0u32.to_le_bytes()); // length
        buf.push(1); // revision
        buf.push(0); // checksum
        buf.extend_from_slice(b"TRELIS");
        buf.extend_from_slice(b"TESTTABL");
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        debug_assert_eq!(buf.len(), SdtHeader::SIZE);
        Self { buf }
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.buf.push(value);
        self
    }

    pub fn u16(mut self, value: u16) -> Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        let len = u32::try_from(self.buf.len()).unwrap();
        self.buf[4..8].copy_from_slice(&len.to_le_bytes());
        fix_checksum(&mut self.buf, 9);
        self.buf
    }
}

/// Rewrites `data[index]` so the whole slice sums to zero.
pub fn fix_checksum(data: &mut [u8], index: usize) {
    data[index] = 0;
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    data[index] = 0u8.wrapping_sub(sum);
}

/// Builds a revision-2 RSDP pointing at an XSDT.
pub fn rsdp_v2(xsdt_phys: u64) -> Vec<u8> {
    let mut rsdp = Vec::with_capacity(36);
    rsdp.extend_from_slice(b"RSD PTR ");
    rsdp.push(0); // checksum
    rsdp.extend_from_slice(b"TRELIS");
    rsdp.push(2);
    rsdp.extend_from_slice(&0u32.to_le_bytes());
    rsdp.extend_from_slice(&36u32.to_le_bytes());
    rsdp.extend_from_slice(&xsdt_phys.to_le_bytes());
    rsdp.push(0); // extended checksum
    rsdp.extend_from_slice(&[0; 3]);
    fix_checksum(&mut rsdp[..20], 8);
    fix_checksum(&mut rsdp, 32);
    rsdp
}

/// A fake physical address space made of leaked buffers.
pub struct FakeMemory {
    regions: Vec<(u64, &'static [u8])>,
    next: u64,
}

impl FakeMemory {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
            next: 0x1000,
        }
    }

    /// Copies `data` into the address space and returns its physical address.
    pub fn place(&mut self, data: &[u8]) -> u64 {
        let phys = self.next;
        let leaked: &'static [u8] = Box::leak(data.to_vec().into_boxed_slice());
        self.regions.push((phys, leaked));
        self.next += (data.len() as u64).div_ceil(0x1000).max(1) * 0x1000;
        phys
    }

    pub fn handler(&self) -> FakeHandler {
        FakeHandler {
            regions: self.regions.clone(),
        }
    }
}

pub struct FakeHandler {
    regions: Vec<(u64, &'static [u8])>,
}

// SAFETY: every returned slice is a leaked, immutable allocation.
unsafe impl AcpiHandler for FakeHandler {
    unsafe fn map_physical_region(&self, phys: u64, size: usize) -> &'static [u8] {
        for &(base, data) in &self.regions {
            let end = base + data.len() as u64;
            if (base..end).contains(&phys) {
                let start = usize::try_from(phys - base).unwrap();
                let stop = data.len().min(start.saturating_add(size));
                return &data[start..stop];
            }
        }
        &[]
    }
}
