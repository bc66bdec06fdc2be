//! Firmware-driven platform discovery for ARM servers.
//!
//! This crate sits between the `trellis-acpi` table parsers and the rest of
//! the kernel. It owns:
//!
//! - [`iort`]: the IORT ID-translation engine. The table is parsed once into
//!   an arena of nodes whose parent links are validated indices, then walked
//!   to turn a requester ID into the device ID an ITS expects.
//! - [`gic`]: the GIC inventory built from the MADT, GIC version detection
//!   and ITS domain registration.
//! - [`gsi`]: mapping of ACPI trigger/polarity pairs to interrupt types.
//! - [`pci::ecam`]: the ECAM region registry and config-space accessors.
//! - [`discovery`]: the boot-time sequence tying the above together.
//!
//! Everything is `no_std` + `alloc`. Discovery runs single-threaded; after
//! it completes, every query takes `&self` and never blocks.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod config;
pub mod discovery;
pub mod error;
pub mod gic;
pub mod gsi;
pub mod iort;
pub mod pci;

#[cfg(test)]
mod testing;

pub use config::{IdRangePolicy, ResolverConfig};
pub use discovery::Platform;
pub use error::{ErrorKind, IortError};
pub use gic::{DistributorProbe, GicError, GicInventory, GicVersion};
pub use gsi::{IrqType, Polarity, Trigger};
pub use iort::{
    DomainToken, DomainTokenRegistry, FirmwareDevice, IortResolver, IortTable, MsiTarget,
    NodeIndex,
};
pub use pci::{ConfigSpaceMmio, EcamError, EcamRegion, EcamRegistry};
