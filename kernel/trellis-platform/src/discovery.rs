//! Boot-time platform discovery.
//!
//! [`Platform::discover`] runs once, single-threaded, after the heap is up:
//! 1. Loads the IORT into an [`IortTable`]
//! 2. Collects the GIC inventory from the MADT and detects the GIC version
//! 3. Registers every ITS as an MSI domain, then freezes the registry
//! 4. Builds the ECAM regions from the MCFG
//!
//! A missing or broken table disables only the subsystem that needs it.

use trellis_acpi::{AcpiError, AcpiHandler, AcpiTables};

use crate::config::ResolverConfig;
use crate::gic::{DistributorProbe, GicInventory, GicVersion};
use crate::iort::{DomainTokenRegistry, IortResolver, IortTable};
use crate::pci::EcamRegistry;

/// Everything discovery found.
pub struct Platform {
    iort: Option<IortTable>,
    gic: Option<GicInventory>,
    gic_version: Option<GicVersion>,
    domains: DomainTokenRegistry,
    ecam: EcamRegistry,
}

impl Platform {
    /// Runs discovery against `tables`.
    ///
    /// `probe` is only used when the MADT leaves the GIC version
    /// unspecified. `config` applies to the loaded IORT.
    pub fn discover<H: AcpiHandler>(
        tables: &AcpiTables<H>,
        probe: &impl DistributorProbe,
        config: ResolverConfig,
    ) -> Self {
        let iort = load_iort(tables, config);
        let domains = DomainTokenRegistry::new();

        let gic = collect_gic(tables);

        let gic_version = gic.as_ref().and_then(|inventory| {
            inventory
                .detect_version(probe)
                .inspect(|v| log::info!("GIC: version {v:?}"))
                .inspect_err(|e| log::error!("GIC: version detection failed: {e}"))
                .ok()
        });

        if let Some(inventory) = &gic {
            match inventory.register_its_domains(&domains) {
                Ok(count) => log::debug!("GIC: registered {count} ITS domains"),
                Err(e) => log::error!("GIC: ITS domain registration failed: {e}"),
            }
        }
        domains.freeze();

        let ecam = match tables.mcfg() {
            Ok(mcfg) => EcamRegistry::from_mcfg(&mcfg).unwrap_or_else(|e| {
                log::error!("PCI: ignoring MCFG: {e}");
                EcamRegistry::new()
            }),
            Err(e) => {
                log::warn!("PCI: MCFG not available: {e}");
                EcamRegistry::new()
            }
        };

        Self {
            iort,
            gic,
            gic_version,
            domains,
            ecam,
        }
    }

    /// The loaded IORT, if the platform has a usable one.
    #[must_use]
    pub fn iort(&self) -> Option<&IortTable> {
        self.iort.as_ref()
    }

    /// A device resolver over the IORT and the ITS domains.
    #[must_use]
    pub fn resolver(&self) -> Option<IortResolver<'_>> {
        self.iort
            .as_ref()
            .map(|table| IortResolver::new(table, &self.domains))
    }

    /// The GIC inventory, if the MADT could be read.
    #[must_use]
    pub fn gic(&self) -> Option<&GicInventory> {
        self.gic.as_ref()
    }

    /// The detected GIC version.
    #[must_use]
    pub fn gic_version(&self) -> Option<GicVersion> {
        self.gic_version
    }

    /// The frozen ITS domain registry.
    #[must_use]
    pub fn domains(&self) -> &DomainTokenRegistry {
        &self.domains
    }

    /// The ECAM regions. Empty without a usable MCFG.
    #[must_use]
    pub fn ecam(&self) -> &EcamRegistry {
        &self.ecam
    }
}

fn collect_gic<H: AcpiHandler>(tables: &AcpiTables<H>) -> Option<GicInventory> {
    let madt = tables
        .madt()
        .inspect_err(|e| log::warn!("GIC: MADT not available: {e}"))
        .ok()?;
    GicInventory::from_madt(&madt)
        .inspect_err(|e| log::error!("GIC: failed to collect MADT entries: {e}"))
        .ok()
}

fn load_iort<H: AcpiHandler>(tables: &AcpiTables<H>, config: ResolverConfig) -> Option<IortTable> {
    let iort = match tables.iort() {
        Ok(iort) => iort,
        Err(AcpiError::TableNotFound) => {
            log::warn!("IORT: table not found");
            return None;
        }
        Err(e) => {
            log::error!("IORT: failed to get table, {e}");
            return None;
        }
    };
    match IortTable::load(&iort) {
        Ok(table) => {
            log::info!("IORT: {} nodes, revision {}", table.len(), table.revision());
            Some(table.with_config(config))
        }
        Err(e) => {
            log::error!("IORT: ignoring table: {e}");
            None
        }
    }
}
