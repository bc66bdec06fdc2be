//! ID translation: walking mappings from a node up to an ITS group.

use super::table::{IortTable, Mapping, NodeIndex};
use crate::error::IortError;

impl IortTable {
    /// Number of hops a walk may take before the table is deemed cyclic.
    fn walk_limit(&self) -> usize {
        self.config().max_walk_depth.unwrap_or(self.len())
    }

    /// Translates `requester_id`, entering the table at `start`, into the
    /// device ID seen by the ITS group at the end of the chain.
    ///
    /// At every node the first mapping in array order that is either a
    /// single mapping or covers the current ID wins. The walk then climbs
    /// through [`IortTable::parent_of`].
    ///
    /// # Errors
    ///
    /// - [`IortError::NoMappingAvailable`] if a node on the way has no mappings.
    /// - [`IortError::NoRouteFound`] if no mapping of a node covers the ID.
    /// - [`IortError::IdOverflow`] if a translated ID exceeds 32 bits.
    /// - [`IortError::WalkLimitExceeded`] if the walk does not terminate.
    /// - Any error of [`IortTable::parent_of`].
    pub fn translate(&self, start: NodeIndex, requester_id: u32) -> Result<u32, IortError> {
        let limit = self.walk_limit();
        let policy = self.config().range_policy;
        let mut index = start;
        let mut id = requester_id;

        for _ in 0..=limit {
            let node = self.get(index)?;
            if node.is_its_group() {
                log::trace!("IORT: reached ITS group {:#x} with id {:#x}", node.offset, id);
                return Ok(id);
            }
            if node.mappings.is_empty() {
                return Err(IortError::NoMappingAvailable { node: node.offset });
            }

            let mapping = node
                .mappings
                .iter()
                .find(|m| m.is_single() || policy.contains(m.input_base, m.id_count, id))
                .ok_or(IortError::NoRouteFound {
                    node: node.offset,
                    id,
                })?;

            let next = apply(mapping, id).ok_or(IortError::IdOverflow {
                node: node.offset,
                id,
            })?;
            log::trace!("IORT: node {:#x} maps {:#x} -> {:#x}", node.offset, id, next);
            id = next;
            index = self.parent_of(index)?;
        }

        log::error!("IORT: walk from node {start:?} exceeded {limit} hops");
        Err(IortError::WalkLimitExceeded { limit })
    }

    /// Returns the `output_base` of the `index`-th single mapping of `node`.
    ///
    /// This is the requester ID a device without a bus-assigned one emits.
    ///
    /// # Errors
    ///
    /// Returns [`IortError::NoMappingAvailable`] if the node has no mappings
    /// and [`IortError::EndpointNotFound`] if it has at most `index` single
    /// mappings.
    pub fn find_endpoint_id(&self, node: NodeIndex, index: usize) -> Result<u32, IortError> {
        let node = self.get(node)?;
        if node.mappings.is_empty() {
            return Err(IortError::NoMappingAvailable { node: node.offset });
        }
        node.mappings
            .iter()
            .filter(|m| m.is_single())
            .nth(index)
            .map(|m| m.output_base)
            .ok_or(IortError::EndpointNotFound {
                node: node.offset,
                index,
            })
    }

    /// Climbs parents from `start` until an ITS group node.
    ///
    /// # Errors
    ///
    /// Any error of [`IortTable::parent_of`], or
    /// [`IortError::WalkLimitExceeded`].
    pub fn its_group_above(&self, start: NodeIndex) -> Result<NodeIndex, IortError> {
        let limit = self.walk_limit();
        let mut index = start;
        for _ in 0..=limit {
            if self.get(index)?.is_its_group() {
                return Ok(index);
            }
            index = self.parent_of(index)?;
        }
        Err(IortError::WalkLimitExceeded { limit })
    }
}

/// Applies one mapping to `id`. `None` if the result leaves the ID space.
fn apply(mapping: &Mapping, id: u32) -> Option<u32> {
    if mapping.is_single() {
        return Some(mapping.output_base);
    }
    mapping.output_base.checked_add(id - mapping.input_base)
}
