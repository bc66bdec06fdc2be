//! PCI configuration space access.
//!
//! Only memory-mapped (ECAM) access is provided. Regions come from the MCFG
//! at boot and from host bridge hot-plug afterwards.

pub mod ecam;

pub use ecam::{AccessWidth, ConfigSpaceMmio, EcamError, EcamRegion, EcamRegistry};

/// Packs a device and function number into a `devfn` byte.
#[must_use]
pub const fn devfn(device: u8, function: u8) -> u8 {
    ((device & 0x1F) << 3) | (function & 0x7)
}
