//! IORT ID translation.
//!
//! The engine is split the way a lookup flows through it:
//!
//! - [`table`]: loads the firmware table into an arena of [`Node`]s.
//! - `scan`: [`IortTable::find_node`] and [`IortTable::parent_of`].
//! - `translate`: [`IortTable::translate`] and friends.
//! - [`registry`]: ITS translation ID to interrupt-domain token.
//! - [`device`]: the [`IortResolver`] façade over OS devices.
//!
//! The table is immutable once loaded and every query takes `&self`, so a
//! loaded table can be shared between CPUs without locking.

pub mod device;
pub mod registry;
mod scan;
pub mod table;
mod translate;

pub use device::{FirmwareDevice, IortResolver, MsiTarget};
pub use registry::{DomainToken, DomainTokenRegistry};
pub use table::{IortTable, Mapping, MappingTarget, Node, NodeIndex, NodeKind, Smmu};
