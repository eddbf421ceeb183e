//! Capabilities the embedding automation platform provides.
//!
//! The dispatcher and the setup flows only talk to the host through these
//! traits, so any platform can drive them.

use std::sync::{PoisonError, RwLock};

use crate::entry::{ConfigEntry, EntryId, EntryOptions};
use crate::schema::ActionSchema;
use crate::template::RenderError;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("no external url available: {0}")]
    NoExternalUrl(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("account {0} is already configured")]
    AlreadyConfigured(String),
    #[error("entry {0} not found")]
    NotFound(EntryId),
}

/// Renders template markup against host state.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, source: &str) -> Result<String, RenderError>;
}

/// The host's externally reachable base address.
pub trait ExternalUrlResolver: Send + Sync {
    fn external_url(&self) -> Result<String, HostError>;
}

/// Registry of callable actions exposed by the host.
pub trait ActionHost: Send + Sync {
    fn has_action(&self, domain: &str, action: &str) -> bool;
    fn register_action(&self, domain: &str, action: &str, schema: &ActionSchema);
    /// Replace the published description of an already registered action.
    fn set_action_schema(&self, domain: &str, action: &str, schema: &ActionSchema);
    fn remove_action(&self, domain: &str, action: &str);
}

/// Persistent storage for configuration records.
pub trait EntryStore: Send + Sync {
    fn is_configured(&self, account_sid: &str) -> bool;
    fn create(&self, entry: ConfigEntry) -> Result<ConfigEntry, StoreError>;
    fn update_options(
        &self,
        entry_id: &EntryId,
        options: EntryOptions,
    ) -> Result<ConfigEntry, StoreError>;
    fn get(&self, entry_id: &EntryId) -> Option<ConfigEntry>;
    fn remove(&self, entry_id: &EntryId) -> Option<ConfigEntry>;
    fn entries(&self) -> Vec<ConfigEntry>;
}

/// In-process [`EntryStore`], unique by account SID.
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    entries: RwLock<Vec<ConfigEntry>>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntryStore for MemoryEntryStore {
    fn is_configured(&self, account_sid: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().any(|e| e.account_sid() == account_sid)
    }

    fn create(&self, entry: ConfigEntry) -> Result<ConfigEntry, StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.iter().any(|e| e.account_sid() == entry.account_sid()) {
            return Err(StoreError::AlreadyConfigured(entry.account_sid().to_string()));
        }
        entries.push(entry.clone());
        Ok(entry)
    }

    fn update_options(
        &self,
        entry_id: &EntryId,
        options: EntryOptions,
    ) -> Result<ConfigEntry, StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .iter_mut()
            .find(|e| &e.entry_id == entry_id)
            .ok_or_else(|| StoreError::NotFound(entry_id.clone()))?;
        entry.options = options;
        Ok(entry.clone())
    }

    fn get(&self, entry_id: &EntryId) -> Option<ConfigEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().find(|e| &e.entry_id == entry_id).cloned()
    }

    fn remove(&self, entry_id: &EntryId) -> Option<ConfigEntry> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let idx = entries.iter().position(|e| &e.entry_id == entry_id)?;
        Some(entries.remove(idx))
    }

    fn entries(&self) -> Vec<ConfigEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
