//! Node lookup and the one-level parent step.

use trellis_acpi::iort::IortNodeType;

use super::table::{IortTable, MappingTarget, Node, NodeIndex};
use crate::error::IortError;

impl IortTable {
    /// Returns the first node of `node_type`, in table order, accepted by
    /// `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`IortError::DeviceNotDescribed`] if no node matches.
    pub fn find_node(
        &self,
        node_type: IortNodeType,
        mut predicate: impl FnMut(&Node) -> bool,
    ) -> Result<NodeIndex, IortError> {
        self.iter()
            .find(|(_, node)| node.node_type == node_type && predicate(node))
            .map(|(index, _)| index)
            .ok_or(IortError::DeviceNotDescribed)
    }

    /// Returns the node the first ID mapping of `index` points to.
    ///
    /// # Errors
    ///
    /// - [`IortError::NoMappingAvailable`] if the node has no mappings.
    /// - [`IortError::FirmwareBug`] if the first mapping's reference is zero.
    /// - [`IortError::ChainBroken`] if it is not the offset of a node.
    pub fn parent_of(&self, index: NodeIndex) -> Result<NodeIndex, IortError> {
        let node = self.get(index)?;
        let first = node
            .mappings
            .first()
            .ok_or(IortError::NoMappingAvailable { node: node.offset })?;

        match first.target {
            MappingTarget::Node(parent) => Ok(parent),
            MappingTarget::Null => {
                log::error!(
                    "IORT: FW BUG: [node {:#x} type {}] ID map has NULL parent reference",
                    node.offset,
                    u8::from(node.node_type)
                );
                Err(IortError::FirmwareBug { node: node.offset })
            }
            MappingTarget::Dangling(reference) => {
                log::error!(
                    "IORT: node {:#x} maps to {:#x}, which is not a node",
                    node.offset,
                    reference
                );
                Err(IortError::ChainBroken {
                    node: node.offset,
                    reference,
                })
            }
        }
    }
}
