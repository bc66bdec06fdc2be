//! The IORT table store.
//!
//! [`IortTable::load`] walks the parsed table once, copies every node into an
//! arena and resolves each mapping's `output_reference` to a [`NodeIndex`].
//! Nothing after load touches raw offsets, so the walk in
//! [`translate`](super::translate) cannot be steered out of bounds by the
//! table contents.

use alloc::string::String;
use alloc::vec::Vec;

use trellis_acpi::iort::{
    IdMapping, IdMappingFlags, Iort, IortNode, IortNodeKind, IortNodeType, NamedComponentFlags,
    SmmuV3Flags,
};

use crate::config::ResolverConfig;
use crate::error::IortError;

/// Index of a node in an [`IortTable`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(usize);

impl NodeIndex {
    /// Position of the node in table order.
    #[must_use]
    pub fn get(self) -> usize {
        self.0
    }
}

/// Where a mapping's output IDs go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingTarget {
    /// A node of this table.
    Node(NodeIndex),
    /// `output_reference` was zero.
    Null,
    /// `output_reference` is not the offset of any node.
    Dangling(u32),
}

/// An ID mapping with its target resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// First input ID covered.
    pub input_base: u32,
    /// Number of IDs covered, minus one.
    pub id_count: u32,
    /// Output ID for `input_base`.
    pub output_base: u32,
    /// Raw `output_reference` as found in the table.
    pub output_reference: u32,
    /// Mapping flags.
    pub flags: IdMappingFlags,
    /// Resolved target.
    pub target: MappingTarget,
}

impl Mapping {
    /// Returns `true` for single mappings.
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.flags.contains(IdMappingFlags::SINGLE_MAPPING)
    }
}

/// SMMU generation and its registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Smmu {
    /// SMMUv1 or SMMUv2.
    V1V2 {
        /// Register base.
        base_address: u64,
        /// Register range length.
        span: u64,
        /// Model.
        model: u32,
    },
    /// SMMUv3.
    V3 {
        /// Register base.
        base_address: u64,
        /// Flags.
        flags: SmmuV3Flags,
        /// Model.
        model: u32,
    },
}

/// Owned, type-specific node payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// ITS group with its translation IDs.
    ItsGroup {
        /// Translation IDs of the ITS units in the group.
        identifiers: Vec<u32>,
    },
    /// Named component.
    NamedComponent {
        /// ACPI namespace path.
        device_name: String,
        /// Flags.
        flags: NamedComponentFlags,
        /// Address size limit in bits.
        memory_address_limit: u8,
    },
    /// PCI root complex.
    PciRootComplex {
        /// PCI segment number.
        pci_segment: u32,
        /// ATS attribute.
        ats_attribute: u32,
    },
    /// SMMU of either generation.
    Smmu(Smmu),
    /// Performance monitoring counter group.
    Pmcg {
        /// Page 0 base address.
        page0_base_address: u64,
    },
    /// Type not decoded.
    Unknown,
}

/// A node in the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Byte offset of the node in the table.
    pub offset: u32,
    /// Raw type tag.
    pub node_type: IortNodeType,
    /// Node identifier.
    pub identifier: u32,
    /// Payload.
    pub kind: NodeKind,
    /// ID mappings in table order.
    pub mappings: Vec<Mapping>,
}

impl Node {
    /// Returns `true` for ITS group nodes, where translation stops.
    #[must_use]
    pub fn is_its_group(&self) -> bool {
        matches!(self.kind, NodeKind::ItsGroup { .. })
    }

    /// PCI segment of a root complex node.
    #[must_use]
    pub fn pci_segment(&self) -> Option<u32> {
        match self.kind {
            NodeKind::PciRootComplex { pci_segment, .. } => Some(pci_segment),
            _ => None,
        }
    }

    /// Namespace path of a named component node.
    #[must_use]
    pub fn device_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::NamedComponent { device_name, .. } => Some(device_name),
            _ => None,
        }
    }

    /// Translation IDs of an ITS group node.
    #[must_use]
    pub fn its_identifiers(&self) -> Option<&[u32]> {
        match &self.kind {
            NodeKind::ItsGroup { identifiers } => Some(identifiers),
            _ => None,
        }
    }
}

/// The validated, immutable IORT.
#[derive(Debug, Clone)]
pub struct IortTable {
    nodes: Vec<Node>,
    revision: u8,
    config: ResolverConfig,
}

impl IortTable {
    /// Builds the arena from a parsed table.
    ///
    /// # Errors
    ///
    /// Returns [`IortError::CorruptTable`] if any of the `node_count` nodes
    /// fails validation, or [`IortError::OutOfMemory`] if the arena cannot
    /// be allocated.
    pub fn load(iort: &Iort<'_>) -> Result<Self, IortError> {
        // A node is at least a header long; don't trust node_count for sizing.
        let max_nodes = iort.len() / IortNode::HEADER_SIZE;
        let mut nodes = Vec::new();
        nodes.try_reserve((iort.node_count() as usize).min(max_nodes))?;

        for node in iort.nodes() {
            nodes.push(copy_node(&node?)?);
        }

        resolve_targets(&mut nodes);

        Ok(Self {
            nodes,
            revision: iort.revision(),
            config: ResolverConfig::default(),
        })
    }

    /// Parses and loads a table image.
    ///
    /// # Errors
    ///
    /// Returns [`IortError::InvalidTable`] if the header is rejected, and
    /// everything [`IortTable::load`] returns.
    pub fn from_bytes(data: &[u8]) -> Result<Self, IortError> {
        Self::load(&Iort::from_bytes(data)?)
    }

    /// Returns the table with `config` applied.
    #[must_use]
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolver settings in force.
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Table revision.
    #[must_use]
    pub fn revision(&self) -> u8 {
        self.revision
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the table has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the node at `index`.
    #[must_use]
    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index.0)
    }

    pub(super) fn get(&self, index: NodeIndex) -> Result<&Node, IortError> {
        self.nodes.get(index.0).ok_or(IortError::StaleIndex)
    }

    /// Iterates over nodes and their indices in table order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeIndex(i), n))
    }

    /// Returns the index of the node at byte `offset`.
    #[must_use]
    pub fn index_of_offset(&self, offset: u32) -> Option<NodeIndex> {
        // Nodes are stored in table order, so offsets are strictly increasing.
        self.nodes
            .binary_search_by_key(&offset, |n| n.offset)
            .ok()
            .map(NodeIndex)
    }
}

fn copy_node(node: &IortNode<'_>) -> Result<Node, IortError> {
    let corrupt = IortError::CorruptTable {
        offset: node.offset,
    };
    let offset = u32::try_from(node.offset).map_err(|_| corrupt)?;

    let kind = match node.kind {
        IortNodeKind::ItsGroup { identifiers } => {
            let mut ids = Vec::new();
            ids.try_reserve_exact(identifiers.len())?;
            ids.extend(identifiers.iter());
            NodeKind::ItsGroup { identifiers: ids }
        }
        IortNodeKind::NamedComponent {
            flags,
            memory_address_limit,
            device_name,
            ..
        } => {
            let mut name = String::new();
            name.try_reserve_exact(device_name.len())?;
            name.push_str(device_name);
            NodeKind::NamedComponent {
                device_name: name,
                flags,
                memory_address_limit,
            }
        }
        IortNodeKind::PciRootComplex {
            ats_attribute,
            pci_segment,
            ..
        } => NodeKind::PciRootComplex {
            pci_segment,
            ats_attribute,
        },
        IortNodeKind::SmmuV1V2 {
            base_address,
            span,
            model,
            ..
        } => NodeKind::Smmu(Smmu::V1V2 {
            base_address,
            span,
            model,
        }),
        IortNodeKind::SmmuV3 {
            base_address,
            flags,
            model,
            ..
        } => NodeKind::Smmu(Smmu::V3 {
            base_address,
            flags,
            model,
        }),
        IortNodeKind::Pmcg { page0_base_address } => NodeKind::Pmcg { page0_base_address },
        IortNodeKind::Unknown => NodeKind::Unknown,
    };

    let mut mappings = Vec::new();
    mappings.try_reserve_exact(node.mappings.len())?;
    mappings.extend(node.mappings.iter().map(|m: IdMapping| Mapping {
        input_base: m.input_base,
        id_count: m.id_count,
        output_base: m.output_base,
        output_reference: m.output_reference,
        flags: m.flags,
        target: MappingTarget::Null,
    }));

    Ok(Node {
        offset,
        node_type: node.node_type,
        identifier: node.identifier,
        kind,
        mappings,
    })
}

/// Turns every `output_reference` into a [`MappingTarget`].
fn resolve_targets(nodes: &mut [Node]) {
    let offsets: Vec<u32> = nodes.iter().map(|n| n.offset).collect();
    for node in nodes.iter_mut() {
        for mapping in &mut node.mappings {
            mapping.target = match mapping.output_reference {
                0 => MappingTarget::Null,
                reference => offsets
                    .binary_search(&reference)
                    .map_or(MappingTarget::Dangling(reference), |i| {
                        MappingTarget::Node(NodeIndex(i))
                    }),
            };
        }
    }
}
