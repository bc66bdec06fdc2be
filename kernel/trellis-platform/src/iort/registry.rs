//! Translation ID to interrupt-domain token registry.
//!
//! Registration happens during discovery, serialized under a spin lock.
//! [`DomainTokenRegistry::freeze`] then moves the entries into a
//! [`spin::Once`], after which lookups read them without taking any lock.
//! The pending list becomes `None` in the same critical section, so no
//! registration can slip in between the move and the freeze.

use alloc::vec::Vec;

use spin::{Mutex, Once};

use crate::error::IortError;

/// Opaque handle identifying an MSI interrupt domain.
///
/// For ITS domains this is the ITS physical base address; the registry never
/// interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DomainToken(pub u64);

#[derive(Debug, Clone, Copy)]
struct Entry {
    translation_id: u32,
    token: DomainToken,
}

/// Append-only map from ITS translation ID to [`DomainToken`].
pub struct DomainTokenRegistry {
    pending: Mutex<Option<Vec<Entry>>>,
    frozen: Once<Vec<Entry>>,
}

impl DomainTokenRegistry {
    /// Creates an empty registry that accepts registrations.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Mutex::new(Some(Vec::new())),
            frozen: Once::new(),
        }
    }

    /// Records `token` for `translation_id`.
    ///
    /// Registering an ID twice is allowed; the newer token shadows the older.
    ///
    /// # Errors
    ///
    /// Returns [`IortError::RegistryFrozen`] after [`freeze`](Self::freeze)
    /// and [`IortError::OutOfMemory`] if the entry cannot be stored.
    pub fn register(&self, translation_id: u32, token: DomainToken) -> Result<(), IortError> {
        let mut guard = self.pending.lock();
        let pending = guard.as_mut().ok_or(IortError::RegistryFrozen)?;
        pending.try_reserve(1)?;
        pending.push(Entry {
            translation_id,
            token,
        });
        log::debug!("IORT: registered domain token {:#x} for ITS {}", token.0, translation_id);
        Ok(())
    }

    /// Ends the registration phase. Later calls are no-ops.
    pub fn freeze(&self) {
        self.frozen
            .call_once(|| self.pending.lock().take().unwrap_or_default());
    }

    /// Returns `true` once [`freeze`](Self::freeze) has run.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.is_completed()
    }

    /// Returns the token registered most recently for `translation_id`.
    ///
    /// Lock-free once frozen. Before that, the lookup takes the registration
    /// lock.
    ///
    /// # Errors
    ///
    /// Returns [`IortError::TokenNotFound`] if the ID was never registered.
    pub fn lookup(&self, translation_id: u32) -> Result<DomainToken, IortError> {
        let not_found = IortError::TokenNotFound { translation_id };
        if let Some(entries) = self.frozen.get() {
            return find_newest(entries, translation_id).ok_or(not_found);
        }
        let guard = self.pending.lock();
        if let Some(pending) = guard.as_deref() {
            return find_newest(pending, translation_id).ok_or(not_found);
        }
        // Caught between the move and the completion of `freeze`.
        drop(guard);
        find_newest(self.frozen.wait(), translation_id).ok_or(not_found)
    }

    /// Number of registered entries, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        if let Some(entries) = self.frozen.get() {
            return entries.len();
        }
        let guard = self.pending.lock();
        match guard.as_deref() {
            Some(pending) => pending.len(),
            None => {
                drop(guard);
                self.frozen.wait().len()
            }
        }
    }

    /// Returns `true` if nothing was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DomainTokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn find_newest(entries: &[Entry], translation_id: u32) -> Option<DomainToken> {
    entries
        .iter()
        .rev()
        .find(|e| e.translation_id == translation_id)
        .map(|e| e.token)
}
