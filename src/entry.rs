//! Persisted account configuration records.

use std::fmt;

use serde::{Deserialize, Serialize};
use sms_core::Credentials;
use time::OffsetDateTime;
use uuid::Uuid;

/// Host-assigned identity of one configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fields written once by the setup flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryData {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub phone_numbers: Vec<String>,
    #[serde(default)]
    pub external_url: String,
}

/// Fields revised through the options flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EntryOptions {
    pub phone_numbers: Option<Vec<String>>,
    pub external_url: Option<String>,
    pub debug: Option<bool>,
}

/// One account configuration as stored by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigEntry {
    pub entry_id: EntryId,
    pub title: String,
    pub data: EntryData,
    #[serde(default)]
    pub options: EntryOptions,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Options-over-data view used at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSettings {
    pub phone_numbers: Vec<String>,
    /// `None` when no external base URL is configured.
    pub external_url: Option<String>,
    pub debug: bool,
}

impl ConfigEntry {
    pub fn new(title: impl Into<String>, data: EntryData) -> Self {
        Self {
            entry_id: EntryId::new(),
            title: title.into(),
            data,
            options: EntryOptions::default(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn account_sid(&self) -> &str {
        &self.data.credentials.account_sid
    }

    pub fn credentials(&self) -> &Credentials {
        &self.data.credentials
    }

    pub fn settings(&self) -> AccountSettings {
        let phone_numbers = self
            .options
            .phone_numbers
            .clone()
            .unwrap_or_else(|| self.data.phone_numbers.clone());
        let external_url = self
            .options
            .external_url
            .clone()
            .unwrap_or_else(|| self.data.external_url.clone());
        AccountSettings {
            phone_numbers,
            external_url: Some(external_url).filter(|url| !url.is_empty()),
            debug: self.options.debug.unwrap_or(false),
        }
    }
}

/// Trim whitespace and trailing slashes from an operator-entered base URL.
pub fn normalize_external_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
