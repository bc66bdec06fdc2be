//! Platform discovery configuration.
//!
//! Compile-time constants live here next to the runtime knobs of the IORT
//! resolver, so there is one place to look for tunables.

/// Largest register offset inside a function's 4 KiB ECAM config space.
pub const ECAM_MAX_REGISTER: u16 = 4095;

/// Size of the config space of a single PCI function under ECAM.
pub const ECAM_FUNCTION_SIZE: u64 = 1 << 12;

/// Size of the config space of a whole bus under ECAM.
pub const ECAM_BUS_SIZE: u64 = 1 << 20;

/// Largest GIC version number the MADT may declare. Higher values are
/// reserved.
pub const GIC_MAX_DECLARED_VERSION: u8 = 4;

/// How an ID mapping's `id_count` bounds its input range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdRangePolicy {
    /// `input_base ..= input_base + id_count`.
    ///
    /// The IORT defines `id_count` as the number of IDs in the range minus
    /// one, so this is the correct reading for conforming firmware.
    #[default]
    Inclusive,
    /// `input_base .. input_base + id_count`.
    Exclusive,
}

impl IdRangePolicy {
    /// Returns `true` if `id` falls in the range starting at `input_base`.
    ///
    /// Arithmetic is done in `u64`, so a range ending at `u32::MAX` does not
    /// wrap.
    #[must_use]
    pub fn contains(self, input_base: u32, id_count: u32, id: u32) -> bool {
        let id = u64::from(id);
        let base = u64::from(input_base);
        let last = base + u64::from(id_count);
        match self {
            Self::Inclusive => (base..=last).contains(&id),
            Self::Exclusive => (base..last).contains(&id),
        }
    }
}

/// Runtime settings of the IORT resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolverConfig {
    /// Input range interpretation.
    pub range_policy: IdRangePolicy,
    /// Maximum number of hops a translation may take. `None` uses the number
    /// of nodes in the table, which no acyclic walk can exceed.
    pub max_walk_depth: Option<usize>,
}

impl ResolverConfig {
    /// Returns a copy with `range_policy` replaced.
    #[must_use]
    pub fn with_range_policy(mut self, range_policy: IdRangePolicy) -> Self {
        self.range_policy = range_policy;
        self
    }

    /// Returns a copy with `max_walk_depth` replaced.
    #[must_use]
    pub fn with_max_walk_depth(mut self, depth: usize) -> Self {
        self.max_walk_depth = Some(depth);
        self
    }
}
