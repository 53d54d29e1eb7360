//! Sender directory learned from the inbound feed.

use std::collections::HashMap;
use std::sync::RwLock;

use mediarelay_core::relay::{PeerResolver, ResolveError, SenderId};

/// Maps sender identifiers to display names.
///
/// Entries are learned as events arrive, the way an update handler fills
/// its entity cache; a later name for the same id replaces the earlier one.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    names: RwLock<HashMap<SenderId, String>>,
}

impl PeerDirectory {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` for `id`. Blank names are ignored.
    pub fn remember(&self, id: &SenderId, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        if let Ok(mut names) = self.names.write() {
            names.insert(id.clone(), name.to_owned());
        }
    }

    /// Number of known senders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.read().map_or(0, |names| names.len())
    }

    /// `true` when no sender is known yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PeerResolver for PeerDirectory {
    fn resolve(&self, sender: &SenderId) -> Result<String, ResolveError> {
        let names = self
            .names
            .read()
            .map_err(|e| ResolveError::Lookup(e.to_string()))?;
        names
            .get(sender)
            .cloned()
            .ok_or_else(|| ResolveError::PeerNotFound(sender.clone()))
    }
}
