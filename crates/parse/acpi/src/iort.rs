//! I/O Remapping Table (IORT) parsing.
//!
//! The IORT describes how requester IDs emitted by PCI root complexes and
//! platform devices are remapped on their way to an SMMU or a GIC ITS. It is
//! a flat array of variable-length nodes; each node may carry an array of ID
//! mappings whose `output_reference` is the byte offset of the next node.
//!
//! Everything here is bounds-checked against the length in the table header.
//! Nodes are validated while iterating, so a corrupt node surfaces as
//! [`AcpiError::CorruptTable`] carrying the node's offset.

use bitflags::bitflags;
use trellis_binparse::FromBytes;

use crate::sdt::{SdtHeader, validate_table};
use crate::{AcpiError, AcpiHandler};

/// IORT table signature.
pub const IORT_SIGNATURE: &[u8; 4] = b"IORT";

/// Raw IORT header fields that follow the SDT header.
#[derive(Debug, Clone, Copy, FromBytes)]
#[repr(C, packed)]
struct IortHeaderFields {
    node_count: u32,
    node_offset: u32,
    reserved: u32,
}

/// Raw node header shared by every node type.
#[derive(Debug, Clone, Copy, FromBytes)]
#[repr(C, packed)]
struct RawNodeHeader {
    node_type: u8,
    length: u16,
    revision: u8,
    identifier: u32,
    mapping_count: u32,
    mapping_offset: u32,
}

/// Raw ID mapping as laid out in the table.
#[derive(Debug, Clone, Copy, FromBytes)]
#[repr(C, packed)]
struct RawIdMapping {
    input_base: u32,
    id_count: u32,
    output_base: u32,
    output_reference: u32,
    flags: u32,
}

/// Parsed IORT table.
#[derive(Debug, Clone, Copy)]
pub struct Iort<'a> {
    /// Whole table, trimmed to the header's declared length.
    data: &'a [u8],
    revision: u8,
    node_count: u32,
    node_offset: u32,
}

impl Iort<'static> {
    /// Parse an IORT from the given physical address.
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::InvalidSignature`], [`AcpiError::InvalidChecksum`]
    /// or [`AcpiError::TruncatedData`] if the table header is unusable.
    pub fn parse(handler: &impl AcpiHandler, phys: u64) -> Result<Self, AcpiError> {
        let table = crate::sdt::load_table(handler, phys, IORT_SIGNATURE)?;
        Self::from_validated(table.header.revision(), table.data)
    }
}

impl<'a> Iort<'a> {
    /// Size of the IORT header (SDT header plus count, offset and reserved).
    pub const HEADER_SIZE: usize = SdtHeader::SIZE + 12;

    /// Parse an IORT from an already-mapped table image.
    ///
    /// # Errors
    ///
    /// See [`Iort::parse`].
    pub fn from_bytes(data: &'a [u8]) -> Result<Self, AcpiError> {
        let table = validate_table(data, IORT_SIGNATURE)?;
        Self::from_validated(table.header.revision(), table.data)
    }

    fn from_validated(revision: u8, data: &'a [u8]) -> Result<Self, AcpiError> {
        let fields =
            IortHeaderFields::read_at(data, SdtHeader::SIZE).ok_or(AcpiError::TruncatedData)?;
        Ok(Self {
            data,
            revision,
            node_count: fields.node_count,
            node_offset: fields.node_offset,
        })
    }

    /// Table revision from the SDT header.
    #[must_use]
    pub fn revision(&self) -> u8 {
        self.revision
    }

    /// Number of nodes the header declares.
    #[must_use]
    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    /// Offset of the first node from the start of the table.
    #[must_use]
    pub fn node_offset(&self) -> u32 {
        self.node_offset
    }

    /// Length of the table in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the table holds nothing beyond its header.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() <= Self::HEADER_SIZE
    }

    /// Returns an iterator over the `node_count` nodes of the table.
    ///
    /// The iterator yields `Err` once for the first invalid node and then
    /// stops. Running out of table before `node_count` nodes have been seen
    /// is reported the same way.
    #[must_use]
    pub fn nodes(&self) -> IortNodeIter<'a> {
        IortNodeIter {
            iort: *self,
            offset: self.node_offset as usize,
            remaining: self.node_count,
            failed: false,
        }
    }

    /// Parses and validates the node starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::CorruptTable`] if the node header, its mapping
    /// array or its type-specific payload does not fit inside the node and
    /// the table.
    pub fn node_at(&self, offset: usize) -> Result<IortNode<'a>, AcpiError> {
        let corrupt = AcpiError::CorruptTable { offset };

        if offset < Self::HEADER_SIZE {
            return Err(corrupt);
        }
        let header = RawNodeHeader::read_at(self.data, offset).ok_or(corrupt)?;
        let length = usize::from(header.length);
        if length < IortNode::HEADER_SIZE {
            return Err(corrupt);
        }
        let end = offset.checked_add(length).ok_or(corrupt)?;
        let node = self.data.get(offset..end).ok_or(corrupt)?;

        // A zero offset means "no mapping array", whatever the count says.
        let mappings = if header.mapping_count == 0 || header.mapping_offset == 0 {
            IdMappings { data: &[] }
        } else {
            let start = header.mapping_offset as usize;
            let size = (header.mapping_count as usize)
                .checked_mul(IdMapping::SIZE)
                .ok_or(corrupt)?;
            let stop = start.checked_add(size).ok_or(corrupt)?;
            if start < IortNode::HEADER_SIZE {
                return Err(corrupt);
            }
            IdMappings {
                data: node.get(start..stop).ok_or(corrupt)?,
            }
        };

        let node_type = IortNodeType::from(header.node_type);
        let kind = IortNodeKind::decode(node_type, node).ok_or(corrupt)?;

        Ok(IortNode {
            offset,
            node_type,
            revision: header.revision,
            length,
            identifier: header.identifier,
            kind,
            mappings,
        })
    }
}

/// Iterator over IORT nodes in table order.
pub struct IortNodeIter<'a> {
    iort: Iort<'a>,
    offset: usize,
    remaining: u32,
    failed: bool,
}

impl<'a> Iterator for IortNodeIter<'a> {
    type Item = Result<IortNode<'a>, AcpiError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        match self.iort.node_at(self.offset) {
            Ok(node) => {
                self.offset += node.length;
                Some(Ok(node))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            (0, Some(0))
        } else {
            (0, Some(self.remaining as usize))
        }
    }
}

impl core::iter::FusedIterator for IortNodeIter<'_> {}

/// IORT node type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IortNodeType {
    /// Type 0: group of GIC ITS units.
    ItsGroup,
    /// Type 1: platform device described in the ACPI namespace.
    NamedComponent,
    /// Type 2: PCI root complex.
    PciRootComplex,
    /// Type 3: SMMUv1 or SMMUv2.
    SmmuV1V2,
    /// Type 4: SMMUv3.
    SmmuV3,
    /// Type 5: performance monitoring counter group.
    Pmcg,
    /// Any other value.
    Unknown(u8),
}

impl From<u8> for IortNodeType {
    fn from(raw: u8) -> Self {
        match raw {
            0 => Self::ItsGroup,
            1 => Self::NamedComponent,
            2 => Self::PciRootComplex,
            3 => Self::SmmuV1V2,
            4 => Self::SmmuV3,
            5 => Self::Pmcg,
            other => Self::Unknown(other),
        }
    }
}

impl From<IortNodeType> for u8 {
    fn from(node_type: IortNodeType) -> Self {
        match node_type {
            IortNodeType::ItsGroup => 0,
            IortNodeType::NamedComponent => 1,
            IortNodeType::PciRootComplex => 2,
            IortNodeType::SmmuV1V2 => 3,
            IortNodeType::SmmuV3 => 4,
            IortNodeType::Pmcg => 5,
            IortNodeType::Unknown(raw) => raw,
        }
    }
}

impl IortNodeType {
    /// Returns `true` for both SMMU generations.
    #[must_use]
    pub fn is_smmu(self) -> bool {
        matches!(self, Self::SmmuV1V2 | Self::SmmuV3)
    }
}

bitflags! {
    /// ID mapping flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IdMappingFlags: u32 {
        /// The mapping maps exactly one ID, independent of the input range.
        const SINGLE_MAPPING = 1 << 0;
    }
}

bitflags! {
    /// Named component node flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NamedComponentFlags: u32 {
        /// The device can tolerate stalled SMMU transactions.
        const STALL_SUPPORTED = 1 << 0;
    }
}

bitflags! {
    /// SMMUv3 node flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SmmuV3Flags: u32 {
        /// Coherent access override.
        const COHERENT_ACCESS = 1 << 0;
        /// Hardware translation table update override (two-bit field).
        const HTTU_OVERRIDE = 0b11 << 1;
        /// The proximity domain field is valid.
        const PROXIMITY_DOMAIN_VALID = 1 << 3;
        /// The device ID mapping index field is valid.
        const DEVICE_ID_MAPPING_VALID = 1 << 4;
    }
}

/// One entry of a node's ID mapping array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdMapping {
    /// First input ID covered by the mapping.
    pub input_base: u32,
    /// Number of IDs in the range, minus one.
    pub id_count: u32,
    /// Output ID corresponding to `input_base`.
    pub output_base: u32,
    /// Byte offset of the node the output IDs are sent to.
    pub output_reference: u32,
    /// Mapping flags.
    pub flags: IdMappingFlags,
}

impl IdMapping {
    /// Size of an ID mapping entry in bytes.
    pub const SIZE: usize = 20;

    /// Returns `true` if this is a single mapping.
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.flags.contains(IdMappingFlags::SINGLE_MAPPING)
    }
}

impl From<RawIdMapping> for IdMapping {
    fn from(raw: RawIdMapping) -> Self {
        Self {
            input_base: raw.input_base,
            id_count: raw.id_count,
            output_base: raw.output_base,
            output_reference: raw.output_reference,
            flags: IdMappingFlags::from_bits_retain(raw.flags),
        }
    }
}

/// A node's ID mapping array, already checked to lie inside the node.
#[derive(Debug, Clone, Copy)]
pub struct IdMappings<'a> {
    data: &'a [u8],
}

impl<'a> IdMappings<'a> {
    /// Number of mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / IdMapping::SIZE
    }

    /// Returns `true` if the node has no mappings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the mapping at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<IdMapping> {
        let offset = index.checked_mul(IdMapping::SIZE)?;
        RawIdMapping::read_at(self.data, offset).map(IdMapping::from)
    }

    /// Returns an iterator over the mappings in array order.
    pub fn iter(&self) -> impl Iterator<Item = IdMapping> + 'a {
        let data = self.data;
        (0..self.len()).filter_map(move |i| {
            RawIdMapping::read_at(data, i * IdMapping::SIZE).map(IdMapping::from)
        })
    }
}

/// The identifier array of an ITS group node.
#[derive(Debug, Clone, Copy)]
pub struct ItsIdentifiers<'a> {
    data: &'a [u8],
}

impl<'a> ItsIdentifiers<'a> {
    /// Number of ITS identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / 4
    }

    /// Returns `true` if the group lists no ITS.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the identifier at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<u32> {
        u32::read_at(self.data, index.checked_mul(4)?)
    }

    /// Returns an iterator over the identifiers.
    pub fn iter(&self) -> impl Iterator<Item = u32> + 'a {
        let data = self.data;
        (0..self.len()).filter_map(move |i| u32::read_at(data, i * 4))
    }
}

/// Type-specific payload of an IORT node.
#[derive(Debug, Clone, Copy)]
pub enum IortNodeKind<'a> {
    /// ITS group.
    ItsGroup {
        /// GIC ITS translation IDs in the group.
        identifiers: ItsIdentifiers<'a>,
    },
    /// Named component.
    NamedComponent {
        /// Node flags.
        flags: NamedComponentFlags,
        /// Memory access properties (cache coherency, hints, memory flags).
        memory_properties: u64,
        /// Device memory address size limit, in bits.
        memory_address_limit: u8,
        /// Full ACPI namespace path of the device, e.g. `\_SB.DEV0`.
        device_name: &'a str,
    },
    /// PCI root complex.
    PciRootComplex {
        /// Memory access properties.
        memory_properties: u64,
        /// ATS support attribute.
        ats_attribute: u32,
        /// PCI segment number, matched against MCFG segment groups.
        pci_segment: u32,
    },
    /// SMMUv1 or SMMUv2.
    SmmuV1V2 {
        /// Base address of the SMMU registers.
        base_address: u64,
        /// Length of the register range.
        span: u64,
        /// SMMU model.
        model: u32,
        /// SMMU flags (bit 0: DVM supported, bit 1: coherent page walk).
        flags: u32,
    },
    /// SMMUv3.
    SmmuV3 {
        /// Base address of the SMMU registers.
        base_address: u64,
        /// SMMUv3 flags.
        flags: SmmuV3Flags,
        /// VATOS register base, or zero.
        vatos_address: u64,
        /// SMMUv3 model.
        model: u32,
    },
    /// Performance monitoring counter group.
    Pmcg {
        /// Base address of page 0 of the PMCG registers.
        page0_base_address: u64,
    },
    /// Node type not decoded by this parser.
    Unknown,
}

impl<'a> IortNodeKind<'a> {
    /// Decodes the payload of `node`, which covers exactly the node bytes.
    fn decode(node_type: IortNodeType, node: &'a [u8]) -> Option<Self> {
        Some(match node_type {
            IortNodeType::ItsGroup => {
                let count = u32::read_at(node, 16)? as usize;
                let size = count.checked_mul(4)?;
                let identifiers = node.get(20..20usize.checked_add(size)?)?;
                Self::ItsGroup {
                    identifiers: ItsIdentifiers { data: identifiers },
                }
            }
            IortNodeType::NamedComponent => {
                let flags = NamedComponentFlags::from_bits_retain(u32::read_at(node, 16)?);
                let memory_properties = u64::read_at(node, 20)?;
                let memory_address_limit = u8::read_at(node, 28)?;
                let name_bytes = node.get(29..)?;
                let nul = name_bytes.iter().position(|&b| b == 0)?;
                let device_name = core::str::from_utf8(&name_bytes[..nul]).ok()?;
                Self::NamedComponent {
                    flags,
                    memory_properties,
                    memory_address_limit,
                    device_name,
                }
            }
            IortNodeType::PciRootComplex => Self::PciRootComplex {
                memory_properties: u64::read_at(node, 16)?,
                ats_attribute: u32::read_at(node, 24)?,
                pci_segment: u32::read_at(node, 28)?,
            },
            IortNodeType::SmmuV1V2 => Self::SmmuV1V2 {
                base_address: u64::read_at(node, 16)?,
                span: u64::read_at(node, 24)?,
                model: u32::read_at(node, 32)?,
                flags: u32::read_at(node, 36)?,
            },
            IortNodeType::SmmuV3 => Self::SmmuV3 {
                base_address: u64::read_at(node, 16)?,
                flags: SmmuV3Flags::from_bits_retain(u32::read_at(node, 24)?),
                vatos_address: u64::read_at(node, 32)?,
                model: u32::read_at(node, 40)?,
            },
            IortNodeType::Pmcg => Self::Pmcg {
                page0_base_address: u64::read_at(node, 16)?,
            },
            IortNodeType::Unknown(_) => Self::Unknown,
        })
    }
}

/// A validated IORT node.
#[derive(Debug, Clone, Copy)]
pub struct IortNode<'a> {
    /// Offset of the node from the start of the table. ID mappings refer to
    /// nodes by this value.
    pub offset: usize,
    /// Node type tag.
    pub node_type: IortNodeType,
    /// Node revision.
    pub revision: u8,
    /// Node length in bytes, never smaller than [`IortNode::HEADER_SIZE`].
    pub length: usize,
    /// Node identifier (reserved in early table revisions).
    pub identifier: u32,
    /// Type-specific payload.
    pub kind: IortNodeKind<'a>,
    /// ID mapping array.
    pub mappings: IdMappings<'a>,
}

impl<'a> IortNode<'a> {
    /// Size of the common node header.
    pub const HEADER_SIZE: usize = 16;

    /// Returns the ACPI namespace path of a named component.
    #[must_use]
    pub fn device_name(&self) -> Option<&'a str> {
        match self.kind {
            IortNodeKind::NamedComponent { device_name, .. } => Some(device_name),
            _ => None,
        }
    }

    /// Returns the PCI segment number of a root complex.
    #[must_use]
    pub fn pci_segment(&self) -> Option<u32> {
        match self.kind {
            IortNodeKind::PciRootComplex { pci_segment, .. } => Some(pci_segment),
            _ => None,
        }
    }

    /// Returns the identifier array of an ITS group.
    #[must_use]
    pub fn its_identifiers(&self) -> Option<ItsIdentifiers<'a>> {
        match self.kind {
            IortNodeKind::ItsGroup { identifiers } => Some(identifiers),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::test_util::TableBuilder;

    const ITS: u8 = 0;
    const NC: u8 = 1;
    const RC: u8 = 2;
    const SMMU_V3: u8 = 4;

    /// Builds one node: header, payload, then the mapping array.
    fn node(node_type: u8, payload: &[u8], mappings: &[[u32; 5]]) -> Vec<u8> {
        let mapping_offset = 16 + payload.len();
        let length = mapping_offset + mappings.len() * IdMapping::SIZE;
        let mut n = Vec::with_capacity(length);
        n.push(node_type);
        n.extend_from_slice(&u16::try_from(length).unwrap().to_le_bytes());
        n.push(0);
        n.extend_from_slice(&0u32.to_le_bytes());
        n.extend_from_slice(&u32::try_from(mappings.len()).unwrap().to_le_bytes());
        let offset = if mappings.is_empty() { 0 } else { mapping_offset };
        n.extend_from_slice(&u32::try_from(offset).unwrap().to_le_bytes());
        n.extend_from_slice(payload);
        for m in mappings {
            for word in m {
                n.extend_from_slice(&word.to_le_bytes());
            }
        }
        n
    }

    fn its_payload(ids: &[u32]) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&u32::try_from(ids.len()).unwrap().to_le_bytes());
        for id in ids {
            p.extend_from_slice(&id.to_le_bytes());
        }
        p
    }

    fn nc_payload(name: &str) -> Vec<u8> {
        let mut p = alloc::vec![0u8; 13];
        p[0] = 1; // stall supported
        p[12] = 48; // address limit
        p.extend_from_slice(name.as_bytes());
        p.push(0);
        while p.len() % 4 != 0 {
            p.push(0);
        }
        p
    }

    fn rc_payload(segment: u32) -> Vec<u8> {
        let mut p = alloc::vec![0u8; 12];
        p.extend_from_slice(&segment.to_le_bytes());
        p.extend_from_slice(&[0; 4]);
        p
    }

    fn table(nodes: &[Vec<u8>]) -> Vec<u8> {
        table_with_count(nodes, u32::try_from(nodes.len()).unwrap())
    }

    fn table_with_count(nodes: &[Vec<u8>], count: u32) -> Vec<u8> {
        let mut builder = TableBuilder::new(IORT_SIGNATURE).u32(count).u32(48).u32(0);
        for n in nodes {
            builder = builder.bytes(n);
        }
        builder.finish()
    }

    fn collect<'a>(iort: &Iort<'a>) -> Vec<Result<IortNode<'a>, AcpiError>> {
        iort.nodes().collect()
    }

    #[test]
    fn parses_typical_topology() {
        let its = node(ITS, &its_payload(&[7, 9]), &[]);
        let its_len = its.len();
        let rc = node(RC, &rc_payload(3), &[[0, 0xFFFF, 0x1_0000, 48, 0]]);
        let nc = node(
            NC,
            &nc_payload("\\_SB.DEV0"),
            &[[0, 0, 0x42, 48, 1], [0x10, 4, 0x80, 48, 0]],
        );
        let data = table(&[its, rc, nc]);
        let iort = Iort::from_bytes(&data).unwrap();
        let nodes: Vec<IortNode<'_>> = iort.nodes().map(Result::unwrap).collect();

        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].offset, 48);
        assert_eq!(nodes[0].node_type, IortNodeType::ItsGroup);
        let ids = nodes[0].its_identifiers().unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids.get(1), Some(9));
        assert_eq!(ids.get(2), None);

        assert_eq!(nodes[1].offset, 48 + its_len);
        assert_eq!(nodes[1].pci_segment(), Some(3));
        assert_eq!(nodes[1].mappings.len(), 1);
        let m = nodes[1].mappings.get(0).unwrap();
        assert_eq!(m.output_base, 0x1_0000);
        assert!(!m.is_single());

        assert_eq!(nodes[2].device_name(), Some("\\_SB.DEV0"));
        let IortNodeKind::NamedComponent {
            flags,
            memory_address_limit,
            ..
        } = nodes[2].kind
        else {
            panic!("expected named component");
        };
        assert!(flags.contains(NamedComponentFlags::STALL_SUPPORTED));
        assert_eq!(memory_address_limit, 48);
        let mappings: Vec<IdMapping> = nodes[2].mappings.iter().collect();
        assert!(mappings[0].is_single());
        assert_eq!(mappings[1].input_base, 0x10);
    }

    #[test]
    fn smmu_v3_payload_is_decoded() {
        let mut payload = alloc::vec![0u8; 28];
        payload[0..8].copy_from_slice(&0x0900_0000u64.to_le_bytes());
        payload[8..12].copy_from_slice(&1u32.to_le_bytes());
        let data = table(&[node(SMMU_V3, &payload, &[[0, 0xFF, 0, 48, 0]])]);
        let iort = Iort::from_bytes(&data).unwrap();
        let smmu = iort.node_at(48).unwrap();
        assert!(smmu.node_type.is_smmu());
        let IortNodeKind::SmmuV3 {
            base_address,
            flags,
            ..
        } = smmu.kind
        else {
            panic!("expected SMMUv3");
        };
        assert_eq!(base_address, 0x0900_0000);
        assert!(flags.contains(SmmuV3Flags::COHERENT_ACCESS));
    }

    #[test]
    fn unknown_node_types_are_kept() {
        let data = table(&[node(0x7F, &[0; 8], &[])]);
        let iort = Iort::from_bytes(&data).unwrap();
        let n = iort.node_at(48).unwrap();
        assert_eq!(n.node_type, IortNodeType::Unknown(0x7F));
        assert!(matches!(n.kind, IortNodeKind::Unknown));
        assert_eq!(u8::from(n.node_type), 0x7F);
    }

    #[test]
    fn node_shorter_than_header_is_corrupt() {
        let mut bad = node(RC, &rc_payload(0), &[]);
        bad[1..3].copy_from_slice(&8u16.to_le_bytes());
        let data = table(&[bad]);
        let iort = Iort::from_bytes(&data).unwrap();
        let results = collect(&iort);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().err(), Some(&AcpiError::CorruptTable { offset: 48 }));
    }

    #[test]
    fn node_past_table_end_is_corrupt() {
        let mut bad = node(RC, &rc_payload(0), &[]);
        bad[1..3].copy_from_slice(&0x400u16.to_le_bytes());
        let data = table(&[bad]);
        let iort = Iort::from_bytes(&data).unwrap();
        assert_eq!(
            iort.node_at(48).err(),
            Some(AcpiError::CorruptTable { offset: 48 })
        );
    }

    #[test]
    fn node_count_beyond_table_is_corrupt() {
        let n = node(RC, &rc_payload(0), &[]);
        let end = 48 + n.len();
        let data = table_with_count(&[n], 2);
        let iort = Iort::from_bytes(&data).unwrap();
        let results = collect(&iort);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert_eq!(
            results[1].as_ref().err(),
            Some(&AcpiError::CorruptTable { offset: end })
        );
    }

    #[test]
    fn mapping_array_outside_node_is_corrupt() {
        let mut bad = node(RC, &rc_payload(0), &[[0, 1, 2, 48, 0]]);
        // Claim three mappings while only one fits.
        bad[8..12].copy_from_slice(&3u32.to_le_bytes());
        let data = table(&[bad.clone()]);
        assert!(matches!(
            Iort::from_bytes(&data).unwrap().node_at(48),
            Err(AcpiError::CorruptTable { offset: 48 })
        ));

        // Mapping offset inside the node header.
        bad[8..12].copy_from_slice(&1u32.to_le_bytes());
        bad[12..16].copy_from_slice(&4u32.to_le_bytes());
        let data = table(&[bad]);
        assert!(Iort::from_bytes(&data).unwrap().node_at(48).is_err());
    }

    #[test]
    fn its_identifiers_outside_node_are_corrupt() {
        let mut bad = node(ITS, &its_payload(&[1]), &[]);
        bad[16..20].copy_from_slice(&100u32.to_le_bytes());
        let data = table(&[bad]);
        assert!(Iort::from_bytes(&data).unwrap().node_at(48).is_err());
    }

    #[test]
    fn unterminated_device_name_is_corrupt() {
        let mut payload = alloc::vec![0u8; 13];
        payload.extend_from_slice(b"DEV0");
        let data = table(&[node(NC, &payload, &[])]);
        assert!(Iort::from_bytes(&data).unwrap().node_at(48).is_err());
    }

    #[test]
    fn offsets_inside_header_are_rejected() {
        let data = table(&[]);
        let iort = Iort::from_bytes(&data).unwrap();
        assert!(iort.is_empty());
        assert_eq!(iort.nodes().count(), 0);
        assert_eq!(
            iort.node_at(0).err(),
            Some(AcpiError::CorruptTable { offset: 0 })
        );
    }

    mod prop {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn arbitrary_node_length_never_panics(length in any::<u16>(), count in 0u32..8) {
                let mut first = node(RC, &rc_payload(0), &[[0, 0xFF, 0, 48, 0]]);
                first[1..3].copy_from_slice(&length.to_le_bytes());
                let second = node(ITS, &its_payload(&[1, 2]), &[]);
                let data = table_with_count(&[first, second], count);
                let iort = Iort::from_bytes(&data).unwrap();
                for result in iort.nodes() {
                    match result {
                        Ok(n) => prop_assert!(n.offset + n.length <= iort.len()),
                        Err(err) => {
                            prop_assert!(matches!(err, AcpiError::CorruptTable { .. }), "unexpected {:?}", err);
                        }
                    }
                }
            }
        }
    }
}
