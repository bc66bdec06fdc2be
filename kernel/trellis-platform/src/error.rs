//! IORT error type and the coarse error taxonomy callers act on.

use trellis_acpi::AcpiError;

/// Coarse classification of a failure.
///
/// Callers usually only need this: `NotFound` means "fall back or do without
/// the feature", the others mean the firmware or the system is broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A node, device, mapping or token is absent.
    NotFound,
    /// Lengths or offsets in the table are inconsistent.
    CorruptTable,
    /// The table is well formed but violates a firmware contract.
    FirmwareBug,
    /// An allocation failed during discovery.
    OutOfMemory,
    /// The operation is not valid in the current lifecycle phase.
    InvalidState,
}

/// Errors produced by the IORT engine and its registry.
///
/// Node locations are reported as byte offsets from the start of the table,
/// the same values firmware uses in `output_reference`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IortError {
    /// The table header could not be validated.
    #[error("IORT header rejected: {0}")]
    InvalidTable(AcpiError),
    /// A node or one of its arrays lies outside its bounds.
    #[error("corrupt IORT node at offset {offset:#x}")]
    CorruptTable {
        /// Offset of the offending node.
        offset: usize,
    },
    /// A translation took more hops than the table can describe.
    #[error("IORT walk exceeded {limit} hops, table is cyclic")]
    WalkLimitExceeded {
        /// The hop limit in force.
        limit: usize,
    },
    /// A translated ID does not fit in 32 bits.
    #[error("ID mapping at node {node:#x} overflows for id {id:#x}")]
    IdOverflow {
        /// Offset of the node whose mapping overflowed.
        node: u32,
        /// The input ID.
        id: u32,
    },
    /// No node in the table describes the device.
    #[error("device not described by the IORT")]
    DeviceNotDescribed,
    /// The node has no ID mapping array.
    #[error("node {node:#x} has no ID mappings")]
    NoMappingAvailable {
        /// Offset of the node.
        node: u32,
    },
    /// No mapping of the node covers the ID.
    #[error("no mapping of node {node:#x} covers id {id:#x}")]
    NoRouteFound {
        /// Offset of the node.
        node: u32,
        /// The ID that found no route.
        id: u32,
    },
    /// A mapping's `output_reference` names no node.
    #[error("node {node:#x} references {reference:#x}, which is not a node")]
    ChainBroken {
        /// Offset of the node holding the mapping.
        node: u32,
        /// The dangling reference.
        reference: u32,
    },
    /// The node has fewer single mappings than requested.
    #[error("node {node:#x} has no single mapping #{index}")]
    EndpointNotFound {
        /// Offset of the node.
        node: u32,
        /// The requested single-mapping index.
        index: usize,
    },
    /// The ITS group has fewer identifiers than requested.
    #[error("ITS index {index} out of range, group has {count}")]
    ItsIndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of identifiers in the group.
        count: usize,
    },
    /// No domain token was registered for the translation ID.
    #[error("no domain token for translation id {translation_id}")]
    TokenNotFound {
        /// The translation ID looked up.
        translation_id: u32,
    },
    /// A mapping's `output_reference` is zero.
    #[error("FW BUG: node {node:#x} has a null output reference")]
    FirmwareBug {
        /// Offset of the node holding the mapping.
        node: u32,
    },
    /// An allocation failed.
    #[error("out of memory")]
    OutOfMemory,
    /// The registry no longer accepts registrations.
    #[error("domain token registry is frozen")]
    RegistryFrozen,
    /// A [`NodeIndex`](crate::iort::NodeIndex) lies past the end of the
    /// table it was used with.
    ///
    /// Indices carry no table identity. An in-range index taken from another
    /// table is not detected and names whatever node sits at that position.
    #[error("node index out of range for this table")]
    StaleIndex,
}

impl IortError {
    /// Returns the taxonomy bucket of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceNotDescribed
            | Self::NoMappingAvailable { .. }
            | Self::NoRouteFound { .. }
            | Self::EndpointNotFound { .. }
            | Self::ItsIndexOutOfRange { .. }
            | Self::TokenNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidTable(_)
            | Self::CorruptTable { .. }
            | Self::WalkLimitExceeded { .. }
            | Self::IdOverflow { .. }
            | Self::ChainBroken { .. } => ErrorKind::CorruptTable,
            Self::FirmwareBug { .. } => ErrorKind::FirmwareBug,
            Self::OutOfMemory => ErrorKind::OutOfMemory,
            Self::RegistryFrozen | Self::StaleIndex => ErrorKind::InvalidState,
        }
    }

    /// Shorthand for `self.kind() == ErrorKind::NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<AcpiError> for IortError {
    fn from(err: AcpiError) -> Self {
        match err {
            AcpiError::CorruptTable { offset } => Self::CorruptTable { offset },
            other => Self::InvalidTable(other),
        }
    }
}

impl From<alloc::collections::TryReserveError> for IortError {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        Self::OutOfMemory
    }
}
