//! # SMS Core
//!
//! Core traits and types shared by the twilio-notify crates.
//!
//! This crate provides the provider-facing building blocks:
//! - [`SmsClient`] trait for sending SMS/MMS messages
//! - [`PhoneNumberDirectory`] trait for listing an account's sender numbers
//! - [`ClientFactory`] for building a [`ProviderClient`] from [`Credentials`]
//! - Common types for requests, responses, and errors
//!
//! ## Example
//!
//! ```rust,ignore
//! use sms_core::{SendRequest, SmsClient};
//!
//! let response = client.send(SendRequest {
//!     to: "+1234567890",
//!     from: "+0987654321",
//!     text: "Hello world!",
//!     media_urls: &[],
//! }).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors that can occur during provider operations
#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    /// HTTP communication error
    #[error("http error: {0}")]
    Http(String),
    /// Authentication/authorization error
    #[error("authentication error: {0}")]
    Auth(String),
    /// Invalid request parameters
    #[error("invalid request: {0}")]
    Invalid(String),
    /// SMS provider returned an error
    #[error("provider error: {0}")]
    Provider(String),
    /// Unexpected error occurred
    #[error("unexpected: {0}")]
    Unexpected(String),
}

impl SmsError {
    /// True when the provider rejected the credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, SmsError::Auth(_))
    }

    /// True for failures reaching or talking to the provider.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, SmsError::Http(_) | SmsError::Provider(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SendRequest<'a> {
    pub to: &'a str,
    pub from: &'a str,
    pub text: &'a str,
    /// Publicly reachable media addresses; non-empty turns the message into an MMS.
    pub media_urls: &'a [String],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    pub id: String,
    /// Name of the backend/provider that produced the response, e.g. "twilio".
    pub provider: &'static str,
    /// Raw provider payload for debugging / audit.
    pub raw: serde_json::Value,
}

/// A sender number owned by a provider account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncomingNumber {
    pub sid: String,
    pub phone_number: String,
    pub friendly_name: String,
}

impl IncomingNumber {
    /// Human-readable label used in selection forms.
    pub fn label(&self) -> String {
        format!("{} ({})", self.friendly_name, self.phone_number)
    }
}

/// Provider account credentials.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub account_sid: String,
    pub auth_token: String,
}

impl Credentials {
    pub fn new(account_sid: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait SmsClient: Send + Sync {
    /// Send a single SMS, or an MMS when media addresses are present.
    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError>;
}

#[async_trait]
pub trait PhoneNumberDirectory: Send + Sync {
    /// List every sender number on the account.
    async fn incoming_phone_numbers(&self) -> Result<Vec<IncomingNumber>, SmsError>;
}

/// A client that can both list sender numbers and send through them.
pub trait ProviderClient: SmsClient + PhoneNumberDirectory {}

impl<T: SmsClient + PhoneNumberDirectory> ProviderClient for T {}

/// Builds provider clients from stored credentials.
pub trait ClientFactory: Send + Sync {
    fn build(&self, credentials: &Credentials) -> Result<Arc<dyn ProviderClient>, SmsError>;
}

/// Utility to create a pseudo id if a provider doesn't return one.
pub fn fallback_id() -> String {
    Uuid::new_v4().to_string()
}
