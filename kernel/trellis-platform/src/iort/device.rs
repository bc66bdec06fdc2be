//! Device resolution: from an OS device to the ITS it talks to.

use trellis_acpi::iort::IortNodeType;

use super::registry::{DomainToken, DomainTokenRegistry};
use super::table::{IortTable, NodeIndex};
use crate::error::IortError;

/// What the IORT engine needs to know about an OS device.
pub trait FirmwareDevice {
    /// Human-readable name for log messages.
    fn name(&self) -> &str;

    /// PCI segment (domain) number if the device sits behind a root complex.
    fn pci_segment(&self) -> Option<u32>;

    /// Full ACPI namespace path (`\_SB.DEV0`) for platform devices.
    fn firmware_path(&self) -> Option<&str>;
}

/// Everything MSI setup needs to program a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsiTarget {
    /// Translation ID of the ITS serving the device.
    pub its_id: u32,
    /// Device ID the ITS sees.
    pub device_id: u32,
    /// Interrupt domain registered for the ITS.
    pub token: DomainToken,
}

/// Answers device queries from an IORT and a domain token registry.
pub struct IortResolver<'a> {
    table: &'a IortTable,
    registry: &'a DomainTokenRegistry,
}

impl<'a> IortResolver<'a> {
    /// Creates a resolver over an already-loaded table and registry.
    #[must_use]
    pub fn new(table: &'a IortTable, registry: &'a DomainTokenRegistry) -> Self {
        Self { table, registry }
    }

    /// The table queries run against.
    #[must_use]
    pub fn table(&self) -> &'a IortTable {
        self.table
    }

    /// Finds the node describing `device`.
    ///
    /// Devices with a firmware path match named components by name; others
    /// match the root complex of their PCI segment.
    ///
    /// # Errors
    ///
    /// Returns [`IortError::DeviceNotDescribed`] if no node matches.
    pub fn find_device_node(&self, device: &impl FirmwareDevice) -> Result<NodeIndex, IortError> {
        let found = if let Some(path) = device.firmware_path() {
            self.table
                .find_node(IortNodeType::NamedComponent, |n| n.device_name() == Some(path))
        } else if let Some(segment) = device.pci_segment() {
            self.find_root_complex(segment)
        } else {
            Err(IortError::DeviceNotDescribed)
        };
        if found.is_err() {
            log::error!("IORT: can't find node related to {} device", device.name());
        }
        found
    }

    fn find_root_complex(&self, segment: u32) -> Result<NodeIndex, IortError> {
        self.table
            .find_node(IortNodeType::PciRootComplex, |n| n.pci_segment() == Some(segment))
    }

    /// Resolves the device ID of a device without a bus-assigned requester
    /// ID.
    ///
    /// The device's own node supplies the requester ID through its first
    /// single mapping; translation then starts at the node's parent.
    ///
    /// # Errors
    ///
    /// Returns [`IortError::DeviceNotDescribed`] if the device has no node,
    /// and any error of [`IortTable::find_endpoint_id`],
    /// [`IortTable::parent_of`] or [`IortTable::translate`].
    pub fn resolve_device_id(&self, device: &impl FirmwareDevice) -> Result<u32, IortError> {
        let node = self.find_device_node(device)?;
        let requester_id = self.table.find_endpoint_id(node, 0).inspect_err(|_| {
            log::error!("IORT: can't find requester ID related to {} device", device.name());
        })?;
        let parent = self.table.parent_of(node).inspect_err(|_| {
            log::error!("IORT: can't find {} parent", device.name());
        })?;
        self.table.translate(parent, requester_id)
    }

    /// Resolves the device ID of a PCI function with a known requester ID.
    ///
    /// # Errors
    ///
    /// Returns [`IortError::DeviceNotDescribed`] if no root complex serves
    /// the device's segment, and any error of [`IortTable::translate`].
    pub fn resolve_pci_id(
        &self,
        device: &impl FirmwareDevice,
        requester_id: u32,
    ) -> Result<u32, IortError> {
        let node = device
            .pci_segment()
            .ok_or(IortError::DeviceNotDescribed)
            .and_then(|segment| self.find_root_complex(segment))
            .inspect_err(|_| {
                log::error!("IORT: can't find node related to {} device", device.name());
            })?;
        self.table.translate(node, requester_id)
    }

    /// Returns the `index`-th ITS translation ID of the group above `device`.
    ///
    /// # Errors
    ///
    /// Returns [`IortError::ItsIndexOutOfRange`] if the group lists at most
    /// `index` ITS units, and any error of [`IortResolver::find_device_node`]
    /// or [`IortTable::its_group_above`].
    pub fn find_its_id(&self, device: &impl FirmwareDevice, index: usize) -> Result<u32, IortError> {
        let node = self.find_device_node(device)?;
        let group = self.table.its_group_above(node)?;
        let identifiers = self
            .table
            .node(group)
            .and_then(|n| n.its_identifiers())
            .unwrap_or(&[]);
        identifiers.get(index).copied().ok_or_else(|| {
            log::error!(
                "IORT: requested ITS ID index [{}] is out of range, ITS count [{}]",
                index,
                identifiers.len()
            );
            IortError::ItsIndexOutOfRange {
                index,
                count: identifiers.len(),
            }
        })
    }

    /// Returns the domain token registered for `translation_id`.
    ///
    /// # Errors
    ///
    /// Returns [`IortError::TokenNotFound`] if none was registered.
    pub fn lookup_domain_token(&self, translation_id: u32) -> Result<DomainToken, IortError> {
        self.registry.lookup(translation_id)
    }

    /// Resolves ITS, device ID and domain for a platform device.
    ///
    /// # Errors
    ///
    /// Any error of [`find_its_id`](Self::find_its_id),
    /// [`resolve_device_id`](Self::resolve_device_id) or
    /// [`lookup_domain_token`](Self::lookup_domain_token).
    pub fn msi_target(&self, device: &impl FirmwareDevice) -> Result<MsiTarget, IortError> {
        let its_id = self.find_its_id(device, 0)?;
        let device_id = self.resolve_device_id(device)?;
        let token = self.lookup_domain_token(its_id)?;
        Ok(MsiTarget {
            its_id,
            device_id,
            token,
        })
    }

    /// Like [`msi_target`](Self::msi_target) for a PCI function.
    ///
    /// # Errors
    ///
    /// Any error of [`find_its_id`](Self::find_its_id),
    /// [`resolve_pci_id`](Self::resolve_pci_id) or
    /// [`lookup_domain_token`](Self::lookup_domain_token).
    pub fn pci_msi_target(
        &self,
        device: &impl FirmwareDevice,
        requester_id: u32,
    ) -> Result<MsiTarget, IortError> {
        let its_id = self.find_its_id(device, 0)?;
        let device_id = self.resolve_pci_id(device, requester_id)?;
        let token = self.lookup_domain_token(its_id)?;
        Ok(MsiTarget {
            its_id,
            device_id,
            token,
        })
    }
}
