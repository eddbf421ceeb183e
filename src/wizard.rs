//! Setup and options flows for Twilio accounts.
//!
//! [`SetupFlow`] walks `start → credentials_entered → numbers_listed →
//! configuration_created`, dropping back to the credential form whenever the
//! provider rejects or cannot answer. [`OptionsFlow`] revises the mutable
//! fields of an existing entry.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use sms_core::{ClientFactory, Credentials, IncomingNumber, PhoneNumberDirectory, SmsError};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::constants::{
    CONF_ACCOUNT_SID, CONF_AUTH_TOKEN, CONF_DEBUG, CONF_EXTERNAL_URL, CONF_PHONE_NUMBERS,
    DEFAULT_TITLE,
};
use crate::entry::{normalize_external_url, ConfigEntry, EntryData, EntryOptions};
use crate::host::{EntryStore, StoreError};

/// Form-level error shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowError {
    InvalidAuth,
    CannotConnect,
    Unknown,
    NoPhoneNumbers,
    NoSelection,
    InvalidSelection,
}

impl FlowError {
    pub fn as_key(&self) -> &'static str {
        match self {
            FlowError::InvalidAuth => "invalid_auth",
            FlowError::CannotConnect => "cannot_connect",
            FlowError::Unknown => "unknown",
            FlowError::NoPhoneNumbers => "no_phone_numbers",
            FlowError::NoSelection => "no_selection",
            FlowError::InvalidSelection => "invalid_selection",
        }
    }

    fn from_provider(err: &SmsError) -> Self {
        if err.is_auth() {
            FlowError::InvalidAuth
        } else if err.is_connectivity() {
            FlowError::CannotConnect
        } else {
            FlowError::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    AlreadyConfigured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    User,
    SelectNumbers,
    Init,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FieldKind {
    String,
    Password,
    Boolean,
    /// Multiple choice over `(value, label)` pairs.
    MultiSelect { options: Vec<(String, String)> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormField {
    pub key: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Form {
    pub step: StepId,
    pub fields: Vec<FormField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FlowError>,
}

impl Form {
    pub fn field(&self, key: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.key == key)
    }
}

/// What the host should do after a flow step.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowResult {
    ShowForm(Form),
    /// A new entry was persisted.
    CreateEntry(ConfigEntry),
    /// The entry's options were persisted; the host should reconfigure it.
    UpdateOptions(ConfigEntry),
    Abort(AbortReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Start,
    CredentialsEntered,
    NumbersListed,
    ConfigurationCreated,
    Aborted,
}

async fn list_numbers(
    factory: &dyn ClientFactory,
    credentials: &Credentials,
) -> Result<Vec<IncomingNumber>, SmsError> {
    let client = factory.build(credentials)?;
    client.incoming_phone_numbers().await
}

fn number_options(numbers: &[IncomingNumber]) -> Vec<(String, String)> {
    numbers
        .iter()
        .map(|n| (n.phone_number.clone(), n.label()))
        .collect()
}

/// Validate a selection against the offered numbers, dropping repeats.
fn checked_selection(
    selection: Vec<String>,
    available: &[IncomingNumber],
) -> Result<Vec<String>, FlowError> {
    if selection.is_empty() {
        return Err(FlowError::NoSelection);
    }
    let mut chosen: Vec<String> = Vec::with_capacity(selection.len());
    for number in selection {
        if !available.iter().any(|n| n.phone_number == number) {
            return Err(FlowError::InvalidSelection);
        }
        if !chosen.contains(&number) {
            chosen.push(number);
        }
    }
    Ok(chosen)
}

/// First-time setup of one Twilio account.
pub struct SetupFlow {
    factory: Arc<dyn ClientFactory>,
    store: Arc<dyn EntryStore>,
    title: String,
    state: FlowState,
    credentials: Option<Credentials>,
    available: Vec<IncomingNumber>,
}

impl SetupFlow {
    pub fn new(factory: Arc<dyn ClientFactory>, store: Arc<dyn EntryStore>) -> Self {
        Self {
            factory,
            store,
            title: DEFAULT_TITLE.to_string(),
            state: FlowState::Start,
            credentials: None,
            available: Vec::new(),
        }
    }

    /// Flow using the configured Twilio API and entry title.
    pub fn from_config(config: &AppConfig, store: Arc<dyn EntryStore>) -> Self {
        Self::new(Arc::new(config.twilio.client_factory()), store)
            .with_title(config.integration.default_title.as_str())
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Credentials entered so far, kept across retries.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn available_numbers(&self) -> &[IncomingNumber] {
        &self.available
    }

    pub fn show_credentials(&self) -> FlowResult {
        FlowResult::ShowForm(self.credentials_form(None))
    }

    fn credentials_form(&self, error: Option<FlowError>) -> Form {
        Form {
            step: StepId::User,
            fields: vec![
                FormField {
                    key: CONF_ACCOUNT_SID,
                    kind: FieldKind::String,
                    required: true,
                    default: self
                        .credentials
                        .as_ref()
                        .map(|c| json!(c.account_sid)),
                },
                FormField {
                    key: CONF_AUTH_TOKEN,
                    kind: FieldKind::Password,
                    required: true,
                    default: None,
                },
            ],
            error,
        }
    }

    fn selection_form(&self, error: Option<FlowError>) -> Form {
        Form {
            step: StepId::SelectNumbers,
            fields: vec![
                FormField {
                    key: CONF_PHONE_NUMBERS,
                    kind: FieldKind::MultiSelect {
                        options: number_options(&self.available),
                    },
                    required: true,
                    default: None,
                },
                FormField {
                    key: CONF_EXTERNAL_URL,
                    kind: FieldKind::String,
                    required: false,
                    default: Some(json!("")),
                },
            ],
            error,
        }
    }

    /// Validate credentials by listing the account's numbers.
    pub async fn begin(&mut self, credentials: Credentials) -> FlowResult {
        self.state = FlowState::CredentialsEntered;
        self.credentials = Some(credentials.clone());
        self.available.clear();

        match list_numbers(self.factory.as_ref(), &credentials).await {
            Ok(numbers) if numbers.is_empty() => {
                warn!(
                    "Twilio account {} has no phone numbers",
                    credentials.account_sid
                );
                FlowResult::ShowForm(self.credentials_form(Some(FlowError::NoPhoneNumbers)))
            }
            Ok(numbers) => {
                debug!("Twilio account offers {} numbers", numbers.len());
                self.available = numbers;
                self.state = FlowState::NumbersListed;
                FlowResult::ShowForm(self.selection_form(None))
            }
            Err(e) => {
                let flow_error = FlowError::from_provider(&e);
                if flow_error == FlowError::Unknown {
                    error!("Unexpected error during Twilio authentication: {}", e);
                } else {
                    error!("Twilio authentication failed: {}", e);
                }
                FlowResult::ShowForm(self.credentials_form(Some(flow_error)))
            }
        }
    }

    /// Pick sender numbers and an optional external URL, then persist.
    pub async fn select_numbers(
        &mut self,
        selection: Vec<String>,
        external_url: &str,
    ) -> FlowResult {
        let Some(credentials) = self.credentials.clone() else {
            return self.show_credentials();
        };
        if self.state != FlowState::NumbersListed {
            return FlowResult::ShowForm(self.credentials_form(None));
        }

        let phone_numbers = match checked_selection(selection, &self.available) {
            Ok(numbers) => numbers,
            Err(e) => return FlowResult::ShowForm(self.selection_form(Some(e))),
        };

        if self.store.is_configured(&credentials.account_sid) {
            info!(
                "Twilio account {} is already configured",
                credentials.account_sid
            );
            self.state = FlowState::Aborted;
            return FlowResult::Abort(AbortReason::AlreadyConfigured);
        }

        let entry = ConfigEntry::new(
            self.title.clone(),
            EntryData {
                credentials,
                phone_numbers,
                external_url: normalize_external_url(external_url),
            },
        );

        match self.store.create(entry) {
            Ok(created) => {
                info!(entry_id = %created.entry_id, "Created Twilio SMS entry");
                self.state = FlowState::ConfigurationCreated;
                FlowResult::CreateEntry(created)
            }
            Err(StoreError::AlreadyConfigured(_)) => {
                self.state = FlowState::Aborted;
                FlowResult::Abort(AbortReason::AlreadyConfigured)
            }
            Err(e) => {
                error!("Failed to persist Twilio SMS entry: {}", e);
                FlowResult::ShowForm(self.selection_form(Some(FlowError::Unknown)))
            }
        }
    }
}

/// Operator input for the options form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionsInput {
    pub phone_numbers: Vec<String>,
    pub external_url: String,
    pub debug: bool,
}

/// Revision of an existing entry's numbers, external URL and debug flag.
pub struct OptionsFlow {
    factory: Arc<dyn ClientFactory>,
    store: Arc<dyn EntryStore>,
    entry: ConfigEntry,
    available: Vec<IncomingNumber>,
}

impl OptionsFlow {
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        store: Arc<dyn EntryStore>,
        entry: ConfigEntry,
    ) -> Self {
        Self {
            factory,
            store,
            entry,
            available: Vec::new(),
        }
    }

    pub fn entry(&self) -> &ConfigEntry {
        &self.entry
    }

    async fn refresh(&mut self) -> Result<(), FlowResult> {
        match list_numbers(self.factory.as_ref(), self.entry.credentials()).await {
            Ok(numbers) => {
                self.available = numbers;
                Ok(())
            }
            Err(e) => {
                error!("Failed to fetch phone numbers: {}", e);
                Err(FlowResult::ShowForm(Form {
                    step: StepId::Init,
                    fields: Vec::new(),
                    error: Some(FlowError::CannotConnect),
                }))
            }
        }
    }

    fn options_form(&self, error: Option<FlowError>) -> Form {
        let current = self.entry.settings();
        Form {
            step: StepId::Init,
            fields: vec![
                FormField {
                    key: CONF_PHONE_NUMBERS,
                    kind: FieldKind::MultiSelect {
                        options: number_options(&self.available),
                    },
                    required: true,
                    default: Some(json!(current.phone_numbers)),
                },
                FormField {
                    key: CONF_EXTERNAL_URL,
                    kind: FieldKind::String,
                    required: false,
                    default: Some(json!(current.external_url.unwrap_or_default())),
                },
                FormField {
                    key: CONF_DEBUG,
                    kind: FieldKind::Boolean,
                    required: false,
                    default: Some(json!(current.debug)),
                },
            ],
            error,
        }
    }

    /// Show the options form pre-filled with the effective settings.
    pub async fn init(&mut self) -> FlowResult {
        if let Err(result) = self.refresh().await {
            return result;
        }
        FlowResult::ShowForm(self.options_form(None))
    }

    /// Re-validate credentials, then persist the revised mutable fields.
    pub async fn revise(&mut self, input: OptionsInput) -> FlowResult {
        if let Err(result) = self.refresh().await {
            return result;
        }

        let phone_numbers = match checked_selection(input.phone_numbers, &self.available) {
            Ok(numbers) => numbers,
            Err(e) => return FlowResult::ShowForm(self.options_form(Some(e))),
        };

        let options = EntryOptions {
            phone_numbers: Some(phone_numbers),
            external_url: Some(normalize_external_url(&input.external_url)),
            debug: Some(input.debug),
        };

        match self.store.update_options(&self.entry.entry_id, options) {
            Ok(updated) => {
                info!(entry_id = %updated.entry_id, "Updated Twilio SMS options");
                self.entry = updated.clone();
                FlowResult::UpdateOptions(updated)
            }
            Err(e) => {
                error!("Failed to persist Twilio SMS options: {}", e);
                FlowResult::ShowForm(self.options_form(Some(FlowError::Unknown)))
            }
        }
    }
}
