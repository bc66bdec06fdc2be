//! GSI trigger mapping.
//!
//! ACPI describes an interrupt line by a trigger mode and a polarity. The
//! interrupt controller wants a single sense type instead.

use bitflags::bitflags;

/// Trigger mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Edge triggered.
    Edge,
    /// Level triggered.
    Level,
}

impl Trigger {
    /// Decodes an "edge" flag bit such as the GICC performance interrupt
    /// mode.
    #[must_use]
    pub fn from_edge_flag(edge: bool) -> Self {
        if edge { Self::Edge } else { Self::Level }
    }
}

/// Polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Active high.
    ActiveHigh,
    /// Active low.
    ActiveLow,
    /// Active on both edges.
    ActiveBoth,
}

bitflags! {
    /// Interrupt sense type, as programmed into the interrupt controller.
    ///
    /// The empty set means "no type", which is what an unsupported
    /// trigger/polarity pair maps to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqType: u32 {
        /// Rising edge.
        const EDGE_RISING = 1 << 0;
        /// Falling edge.
        const EDGE_FALLING = 1 << 1;
        /// Both edges.
        const EDGE_BOTH = Self::EDGE_RISING.bits() | Self::EDGE_FALLING.bits();
        /// High level.
        const LEVEL_HIGH = 1 << 2;
        /// Low level.
        const LEVEL_LOW = 1 << 3;
    }
}

impl IrqType {
    /// No sense type.
    pub const NONE: Self = Self::empty();

    /// Returns `true` for any edge type.
    #[must_use]
    pub fn is_edge(self) -> bool {
        self.intersects(Self::EDGE_BOTH)
    }

    /// Returns `true` for any level type.
    #[must_use]
    pub fn is_level(self) -> bool {
        self.intersects(Self::LEVEL_HIGH | Self::LEVEL_LOW)
    }
}

/// Maps an ACPI trigger/polarity pair to an [`IrqType`].
///
/// Level-triggered lines that are active on both levels make no sense and
/// map to [`IrqType::NONE`].
#[must_use]
pub fn irq_type(trigger: Trigger, polarity: Polarity) -> IrqType {
    match (polarity, trigger) {
        (Polarity::ActiveLow, Trigger::Edge) => IrqType::EDGE_FALLING,
        (Polarity::ActiveLow, Trigger::Level) => IrqType::LEVEL_LOW,
        (Polarity::ActiveHigh, Trigger::Edge) => IrqType::EDGE_RISING,
        (Polarity::ActiveHigh, Trigger::Level) => IrqType::LEVEL_HIGH,
        (Polarity::ActiveBoth, Trigger::Edge) => IrqType::EDGE_BOTH,
        (Polarity::ActiveBoth, Trigger::Level) => IrqType::NONE,
    }
}
