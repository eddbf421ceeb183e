//! Runtime registry of active accounts and the `send_message` action.

use std::sync::Arc;

use sms_core::{ClientFactory, ProviderClient, SendRequest, SendResponse, SmsError};
use tracing::{debug, error, info};

use crate::constants::{DOMAIN, SERVICE_SEND_MESSAGE};
use crate::entry::{ConfigEntry, EntryId};
use crate::host::{ActionHost, ExternalUrlResolver, TemplateRenderer};
use crate::media::rewrite_media_reference;
use crate::schema::{action_schema, ActionSchema, SchemaError, SendMessageParams};
use crate::template::{RenderError, TemplateValue};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to create client for entry {entry_id}: {source}")]
    Client {
        entry_id: EntryId,
        #[source]
        source: SmsError,
    },
    #[error("account {account_sid} is already active as entry {entry_id}")]
    DuplicateAccount {
        account_sid: String,
        entry_id: EntryId,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("from_number {0} not in configured numbers")]
    UnknownSender(String),
    #[error("no client found for from_number {0}")]
    NoClientForSender(String),
}

/// Runtime state of one active account.
#[derive(Clone)]
pub struct RegistryEntry {
    pub account_sid: String,
    pub client: Arc<dyn ProviderClient>,
    pub phone_numbers: Vec<String>,
    pub external_url: Option<String>,
    pub debug: bool,
}

/// Result of sending to one target.
#[derive(Debug)]
pub struct TargetOutcome {
    pub target: String,
    pub result: Result<SendResponse, SmsError>,
}

/// Per-target results of one invocation, in target order.
#[derive(Debug)]
pub struct DispatchReport {
    pub entry_id: EntryId,
    pub from_number: String,
    pub media_urls: Vec<String>,
    pub outcomes: Vec<TargetOutcome>,
}

impl DispatchReport {
    pub fn sent(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.sent()
    }
}

/// Owns the registry and keeps the host's action registration in sync with it.
pub struct Dispatcher {
    factory: Arc<dyn ClientFactory>,
    actions: Arc<dyn ActionHost>,
    renderer: Arc<dyn TemplateRenderer>,
    urls: Arc<dyn ExternalUrlResolver>,
    registry: Vec<(EntryId, RegistryEntry)>,
}

impl Dispatcher {
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        actions: Arc<dyn ActionHost>,
        renderer: Arc<dyn TemplateRenderer>,
        urls: Arc<dyn ExternalUrlResolver>,
    ) -> Self {
        Self {
            factory,
            actions,
            renderer,
            urls,
            registry: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn is_active(&self, entry_id: &EntryId) -> bool {
        self.registry.iter().any(|(id, _)| id == entry_id)
    }

    /// De-duplicated union of every active account's numbers, in registration order.
    pub fn sender_numbers(&self) -> Vec<String> {
        let mut all: Vec<String> = Vec::new();
        for (_, entry) in &self.registry {
            for number in &entry.phone_numbers {
                if !all.contains(number) {
                    all.push(number.clone());
                }
            }
        }
        all
    }

    pub fn schema(&self) -> ActionSchema {
        action_schema(&self.sender_numbers())
    }

    /// First active entry (registration order) that owns `from_number`.
    pub fn owner_of(&self, from_number: &str) -> Option<(&EntryId, &RegistryEntry)> {
        self.registry
            .iter()
            .find(|(_, entry)| entry.phone_numbers.iter().any(|n| n == from_number))
            .map(|(id, entry)| (id, entry))
    }

    /// Bring an entry online and make sure the action is registered.
    pub fn activate(&mut self, entry: &ConfigEntry) -> Result<(), DispatchError> {
        if let Some((other, _)) = self
            .registry
            .iter()
            .find(|(id, e)| id != &entry.entry_id && e.account_sid == entry.account_sid())
        {
            return Err(DispatchError::DuplicateAccount {
                account_sid: entry.account_sid().to_string(),
                entry_id: other.clone(),
            });
        }

        let client = self
            .factory
            .build(entry.credentials())
            .map_err(|source| DispatchError::Client {
                entry_id: entry.entry_id.clone(),
                source,
            })?;

        let settings = entry.settings();
        let runtime = RegistryEntry {
            account_sid: entry.account_sid().to_string(),
            client,
            phone_numbers: settings.phone_numbers,
            external_url: settings.external_url,
            debug: settings.debug,
        };

        match self.registry.iter_mut().find(|(id, _)| id == &entry.entry_id) {
            Some((_, slot)) => *slot = runtime,
            None => self.registry.push((entry.entry_id.clone(), runtime)),
        }

        let schema = self.schema();
        if !self.actions.has_action(DOMAIN, SERVICE_SEND_MESSAGE) {
            self.actions
                .register_action(DOMAIN, SERVICE_SEND_MESSAGE, &schema);
        }
        self.actions
            .set_action_schema(DOMAIN, SERVICE_SEND_MESSAGE, &schema);

        info!(
            entry_id = %entry.entry_id,
            active = self.registry.len(),
            "Activated Twilio account {}",
            entry.account_sid()
        );
        Ok(())
    }

    /// Take an entry offline. Returns whether it was active.
    pub fn deactivate(&mut self, entry_id: &EntryId) -> bool {
        let Some(idx) = self.registry.iter().position(|(id, _)| id == entry_id) else {
            return false;
        };
        self.registry.remove(idx);

        if self.registry.is_empty() {
            self.actions.remove_action(DOMAIN, SERVICE_SEND_MESSAGE);
            info!(entry_id = %entry_id, "Last entry removed, action unregistered");
        } else {
            self.actions
                .set_action_schema(DOMAIN, SERVICE_SEND_MESSAGE, &self.schema());
            debug!(entry_id = %entry_id, "Entry removed, action schema refreshed");
        }
        true
    }

    /// Reload an entry after its options changed.
    pub fn reconfigure(&mut self, entry: &ConfigEntry) -> Result<(), DispatchError> {
        self.deactivate(&entry.entry_id);
        self.activate(entry)
    }

    /// Validate raw call data against the current schema and invoke.
    pub async fn handle_call(
        &self,
        data: &serde_json::Value,
    ) -> Result<DispatchReport, DispatchError> {
        let params = self.schema().parse_call(data)?;
        self.invoke(&params).await
    }

    /// Render inputs and send to every target, one after another.
    pub async fn invoke(
        &self,
        params: &SendMessageParams,
    ) -> Result<DispatchReport, DispatchError> {
        let renderer = self.renderer.as_ref();
        let targets = render_all(&params.targets, renderer)?;
        let message = params.message.render(renderer)?;
        let media_raw = render_all(&params.media_urls, renderer)?;

        let from_number = params.from_number.as_str();
        if !self.sender_numbers().iter().any(|n| n == from_number) {
            error!("from_number {} not in configured numbers", from_number);
            return Err(DispatchError::UnknownSender(from_number.to_string()));
        }

        let Some((entry_id, owner)) = self.owner_of(from_number) else {
            error!("No client found for from_number {}", from_number);
            return Err(DispatchError::NoClientForSender(from_number.to_string()));
        };

        let media_urls: Vec<String> = media_raw
            .iter()
            .map(|reference| {
                rewrite_media_reference(
                    reference,
                    owner.external_url.as_deref(),
                    self.urls.as_ref(),
                    owner.debug,
                )
            })
            .collect();

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            if owner.debug {
                info!(
                    "Sending to {} from {} with media_urls: {:?}",
                    target, from_number, media_urls
                );
            }

            let result = owner
                .client
                .send(SendRequest {
                    to: &target,
                    from: from_number,
                    text: &message,
                    media_urls: &media_urls,
                })
                .await;

            match &result {
                Ok(_) => debug!("SMS sent to {}", target),
                Err(e) => error!("Failed to send SMS to {}: {}", target, e),
            }
            outcomes.push(TargetOutcome { target, result });
        }

        Ok(DispatchReport {
            entry_id: entry_id.clone(),
            from_number: from_number.to_string(),
            media_urls,
            outcomes,
        })
    }
}

fn render_all(
    values: &[TemplateValue],
    renderer: &dyn TemplateRenderer,
) -> Result<Vec<String>, RenderError> {
    values.iter().map(|v| v.render(renderer)).collect()
}
