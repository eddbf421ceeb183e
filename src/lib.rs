//! # Twilio Notify
//!
//! SMS/MMS notifications through Twilio for home-automation hosts.
//!
//! ## Features
//!
//! - **Setup flow**: validate credentials, pick sender numbers, persist an entry
//! - **Options flow**: revise numbers, external URL and verbose logging
//! - **Dispatcher**: one `send_message` action across every configured account
//! - **Templates**: targets, body and media references may be host templates
//! - **MMS**: local media paths are rewritten onto an external base URL
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use twilio_notify::prelude::*;
//!
//! let config = AppConfig::load()?;
//! telemetry::init_tracing(&config.logging);
//!
//! let mut flow = SetupFlow::from_config(&config, store.clone());
//!
//! let factory = Arc::new(config.twilio.client_factory());
//! let mut dispatcher = Dispatcher::new(factory, actions, renderer, urls);
//! for entry in store.entries() {
//!     dispatcher.activate(&entry)?;
//! }
//!
//! let report = dispatcher.handle_call(&serde_json::json!({
//!     "target": "+15551234567",
//!     "message": "Garage door left open",
//!     "from_number": "+15557654321"
//! })).await?;
//! println!("sent {} / failed {}", report.sent(), report.failed());
//! ```

pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod entry;
pub mod host;
pub mod media;
pub mod schema;
pub mod telemetry;
pub mod template;
pub mod wizard;

pub use crate::config::*;

/// Common imports for Twilio Notify usage
pub mod prelude {
    pub use crate::config::{AppConfig, IntegrationConfig, LoggingConfig, TwilioApiConfig};
    pub use crate::dispatcher::{DispatchError, DispatchReport, Dispatcher, TargetOutcome};
    pub use crate::entry::{ConfigEntry, EntryData, EntryId, EntryOptions};
    pub use crate::host::{
        ActionHost, EntryStore, ExternalUrlResolver, HostError, MemoryEntryStore, StoreError,
        TemplateRenderer,
    };
    pub use crate::schema::{action_schema, ActionSchema, SendMessageParams};
    pub use crate::telemetry;
    pub use crate::template::{RenderError, TemplateValue};
    pub use crate::wizard::{FlowError, FlowResult, OptionsFlow, OptionsInput, SetupFlow};
    pub use sms_core::*;
    pub use sms_twilio::{TwilioClient, TwilioClientFactory};
}
