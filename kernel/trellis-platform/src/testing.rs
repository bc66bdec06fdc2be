//! Synthetic firmware tables and a fake physical address space for unit
//! tests.
//!
//! IORT nodes are added as [`NodeSpec`]s and referenced by the handle `add`
//! returns; offsets are worked out when the image is built, so a node can
//! map to a node added after it.

use alloc::boxed::Box;
use alloc::vec::Vec;

use trellis_acpi::madt::MadtEntry;
use trellis_acpi::{AcpiHandler, AcpiTables};

const HEADER_SIZE: usize = 48;
const NODE_HEADER_SIZE: usize = 16;
const MAPPING_SIZE: usize = 20;

#[derive(Debug, Clone, Copy)]
enum Reference {
    Node(usize),
    Raw(u32),
}

#[derive(Debug, Clone, Copy)]
struct MappingSpec {
    input_base: u32,
    id_count: u32,
    output_base: u32,
    reference: Reference,
    flags: u32,
}

/// One node to be laid out by [`IortBuilder`].
#[derive(Debug, Clone)]
pub struct NodeSpec {
    node_type: u8,
    payload: Vec<u8>,
    mappings: Vec<MappingSpec>,
}

impl NodeSpec {
    pub fn raw(node_type: u8, payload: &[u8]) -> Self {
        Self {
            node_type,
            payload: payload.to_vec(),
            mappings: Vec::new(),
        }
    }

    pub fn its_group(ids: &[u32]) -> Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&u32::try_from(ids.len()).unwrap().to_le_bytes());
        for id in ids {
            payload.extend_from_slice(&id.to_le_bytes());
        }
        Self::raw(0, &payload)
    }

    pub fn named_component(name: &str) -> Self {
        let mut payload = alloc::vec![0u8; 13];
        payload.extend_from_slice(name.as_bytes());
        payload.push(0);
        while payload.len() % 4 != 0 {
            payload.push(0);
        }
        Self::raw(1, &payload)
    }

    pub fn root_complex(segment: u32) -> Self {
        let mut payload = alloc::vec![0u8; 12];
        payload.extend_from_slice(&segment.to_le_bytes());
        payload.extend_from_slice(&[0; 4]);
        Self::raw(2, &payload)
    }

    pub fn smmu_v3(base: u64) -> Self {
        let mut payload = alloc::vec![0u8; 28];
        payload[..8].copy_from_slice(&base.to_le_bytes());
        Self::raw(4, &payload)
    }

    /// Adds a range mapping to the node behind `target`.
    pub fn map(self, input_base: u32, id_count: u32, output_base: u32, target: usize) -> Self {
        self.push(input_base, id_count, output_base, Reference::Node(target), 0)
    }

    /// Adds a single mapping to the node behind `target`.
    pub fn single(self, output_base: u32, target: usize) -> Self {
        self.push(0, 0, output_base, Reference::Node(target), 1)
    }

    /// Adds a range mapping with a literal `output_reference`.
    pub fn map_raw(self, input_base: u32, id_count: u32, output_base: u32, reference: u32) -> Self {
        self.push(input_base, id_count, output_base, Reference::Raw(reference), 0)
    }

    /// Adds a single mapping with a literal `output_reference`.
    pub fn single_raw(self, output_base: u32, reference: u32) -> Self {
        self.push(0, 0, output_base, Reference::Raw(reference), 1)
    }

    fn push(
        mut self,
        input_base: u32,
        id_count: u32,
        output_base: u32,
        reference: Reference,
        flags: u32,
    ) -> Self {
        self.mappings.push(MappingSpec {
            input_base,
            id_count,
            output_base,
            reference,
            flags,
        });
        self
    }

    fn len(&self) -> usize {
        NODE_HEADER_SIZE + self.payload.len() + self.mappings.len() * MAPPING_SIZE
    }
}

/// Lays out an IORT image.
#[derive(Debug, Clone, Default)]
pub struct IortBuilder {
    nodes: Vec<NodeSpec>,
    node_count: Option<u32>,
}

impl IortBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node and returns its handle.
    pub fn add(&mut self, spec: NodeSpec) -> usize {
        self.nodes.push(spec);
        self.nodes.len() - 1
    }

    /// Overrides the node count written to the header.
    pub fn node_count(&mut self, count: u32) {
        self.node_count = Some(count);
    }

    /// Byte offset the node behind `handle` will have.
    pub fn offset(&self, handle: usize) -> u32 {
        let before: usize = self.nodes[..handle].iter().map(NodeSpec::len).sum();
        u32::try_from(HEADER_SIZE + before).unwrap()
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = Vec::new();
        let count = self
            .node_count
            .unwrap_or_else(|| u32::try_from(self.nodes.len()).unwrap());
        data.extend_from_slice(&count.to_le_bytes());
        data.extend_from_slice(&u32::try_from(HEADER_SIZE).unwrap().to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());

        for spec in &self.nodes {
            let mapping_offset = NODE_HEADER_SIZE + spec.payload.len();
            data.push(spec.node_type);
            data.extend_from_slice(&u16::try_from(spec.len()).unwrap().to_le_bytes());
            data.push(0);
            data.extend_from_slice(&0u32.to_le_bytes());
            data.extend_from_slice(&u32::try_from(spec.mappings.len()).unwrap().to_le_bytes());
            let offset = if spec.mappings.is_empty() { 0 } else { mapping_offset };
            data.extend_from_slice(&u32::try_from(offset).unwrap().to_le_bytes());
            data.extend_from_slice(&spec.payload);
            for m in &spec.mappings {
                let reference = match m.reference {
                    Reference::Node(handle) => self.offset(handle),
                    Reference::Raw(raw) => raw,
                };
                for word in [m.input_base, m.id_count, m.output_base, reference, m.flags] {
                    data.extend_from_slice(&word.to_le_bytes());
                }
            }
        }

        let data = sdt(b"IORT", &data);
        assert_eq!(data.len(), usize::try_from(self.offset(self.nodes.len())).unwrap());
        data
    }
}

/// Wraps `body` in an SDT header with a valid length and checksum.
pub fn sdt(signature: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(36 + body.len());
    data.extend_from_slice(signature);
    data.extend_from_slice(&0u32.to_le_bytes()); // length, patched below
    data.push(0); // revision
    data.push(0); // checksum, patched below
    data.extend_from_slice(b"TRELIS");
    data.extend_from_slice(b"TESTTABL");
    data.extend_from_slice(&[0; 12]);
    data.extend_from_slice(body);
    let len = u32::try_from(data.len()).unwrap();
    data[4..8].copy_from_slice(&len.to_le_bytes());
    fix_checksum(&mut data, 9);
    data
}

/// Rewrites `data[index]` so the whole slice sums to zero.
pub fn fix_checksum(data: &mut [u8], index: usize) {
    data[index] = 0;
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    data[index] = 0u8.wrapping_sub(sum);
}

/// Lays out a MADT with GIC entries.
#[derive(Debug, Clone, Default)]
pub struct MadtBuilder {
    entries: Vec<u8>,
}

impl MadtBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry of `entry_type` with `body` after the 2-byte header.
    pub fn raw(mut self, entry_type: u8, body: &[u8]) -> Self {
        self.entries.push(entry_type);
        self.entries.push(u8::try_from(body.len() + 2).unwrap());
        self.entries.extend_from_slice(body);
        self
    }

    pub fn gicc(self, cpu_interface_number: u32) -> Self {
        let mut body = alloc::vec![0u8; 74];
        body[2..6].copy_from_slice(&cpu_interface_number.to_le_bytes());
        body[10..14].copy_from_slice(&1u32.to_le_bytes()); // enabled
        self.raw(MadtEntry::GICC, &body)
    }

    pub fn gicd(self, base: u64, version: u8) -> Self {
        let mut body = alloc::vec![0u8; 22];
        body[6..14].copy_from_slice(&base.to_le_bytes());
        body[18] = version;
        self.raw(MadtEntry::GICD, &body)
    }

    pub fn msi_frame(self, id: u32, base: u64) -> Self {
        let mut body = alloc::vec![0u8; 22];
        body[2..6].copy_from_slice(&id.to_le_bytes());
        body[6..14].copy_from_slice(&base.to_le_bytes());
        self.raw(MadtEntry::GIC_MSI_FRAME, &body)
    }

    pub fn gicr(self, base: u64) -> Self {
        let mut body = alloc::vec![0u8; 14];
        body[2..10].copy_from_slice(&base.to_le_bytes());
        body[10..14].copy_from_slice(&0x0002_0000u32.to_le_bytes());
        self.raw(MadtEntry::GICR, &body)
    }

    pub fn its(self, translation_id: u32, base: u64) -> Self {
        let mut body = alloc::vec![0u8; 18];
        body[2..6].copy_from_slice(&translation_id.to_le_bytes());
        body[6..14].copy_from_slice(&base.to_le_bytes());
        self.raw(MadtEntry::GIC_ITS, &body)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_le_bytes()); // local interrupt controller
        body.extend_from_slice(&0u32.to_le_bytes()); // flags
        body.extend_from_slice(&self.entries);
        sdt(b"APIC", &body)
    }
}

/// Builds an MCFG from `(base, segment, start_bus, end_bus)` entries.
pub fn mcfg(entries: &[(u64, u16, u8, u8)]) -> Vec<u8> {
    let mut body = alloc::vec![0u8; 8];
    for &(base, segment, start, end) in entries {
        body.extend_from_slice(&base.to_le_bytes());
        body.extend_from_slice(&segment.to_le_bytes());
        body.push(start);
        body.push(end);
        body.extend_from_slice(&[0; 4]);
    }
    sdt(b"MCFG", &body)
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

    /// Places `tables` behind an XSDT and a revision-2 RSDP.
    pub fn acpi_tables(mut self, tables: &[Vec<u8>]) -> AcpiTables<FakeHandler> {
        let mut xsdt = Vec::new();
        for table in tables {
            xsdt.extend_from_slice(&self.place(table).to_le_bytes());
        }
        let xsdt_phys = self.place(&sdt(b"XSDT", &xsdt));

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
        let rsdp_phys = self.place(&rsdp);

        AcpiTables::new(rsdp_phys, FakeHandler { regions: self.regions }).unwrap()
    }
}

impl Default for FakeMemory {
    fn default() -> Self {
        Self::new()
    }
}

/// [`AcpiHandler`] over a [`FakeMemory`].
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
