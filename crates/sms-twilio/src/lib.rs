//! # Twilio Provider
//!
//! Minimal Twilio REST client covering the two calls the integration needs:
//! listing an account's incoming phone numbers and creating a message.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sms_core::{SendRequest, SmsClient};
//! use sms_twilio::TwilioClient;
//!
//! let client = TwilioClient::new("ACxxxx", "auth-token")?;
//! let response = client.send(SendRequest {
//!     to: "+1234567890",
//!     from: "+0987654321",
//!     text: "Hello from Twilio!",
//!     media_urls: &[],
//! }).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use sms_core::{
    ClientFactory, Credentials, IncomingNumber, PhoneNumberDirectory, ProviderClient,
    SendRequest, SendResponse, SmsClient, SmsError,
};
use tracing::{debug, error, info, instrument};
use url::Url;

pub const PROVIDER: &str = "twilio";
pub const DEFAULT_BASE_URL: &str = "https://api.twilio.com";
pub const API_VERSION: &str = "2010-04-01";
/// Twilio error code returned for rejected credentials.
pub const AUTHENTICATION_ERROR_CODE: u32 = 20003;
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Twilio REST client.
#[derive(Clone)]
pub struct TwilioClient {
    account_sid: String,
    auth_token: String,
    /// API base URL; override for testing/mocking.
    base_url: Url,
    page_size: u32,
    http: reqwest::Client,
}

impl std::fmt::Debug for TwilioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioClient")
            .field("account_sid", &self.account_sid)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl TwilioClient {
    pub fn new<S: Into<String>>(account_sid: S, auth_token: S) -> Result<Self, SmsError> {
        Self::with_base_url(account_sid, auth_token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url<S: Into<String>>(
        account_sid: S,
        auth_token: S,
        base_url: &str,
    ) -> Result<Self, SmsError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SmsError::Invalid(format!("base url {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(SmsError::Invalid(format!(
                "base url {} cannot carry a path",
                base_url
            )));
        }
        Ok(Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            base_url,
            page_size: DEFAULT_PAGE_SIZE,
            http: reqwest::Client::new(),
        })
    }

    /// Replace the HTTP client, e.g. to set timeouts.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn account_sid(&self) -> &str {
        &self.account_sid
    }

    fn endpoint(&self, resource: &str) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in the constructor
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend([API_VERSION, "Accounts", &self.account_sid, resource]);
        }
        url
    }

    /// Fetch every incoming phone number on the account, following pagination.
    #[instrument(skip(self), fields(account_sid = %self.account_sid))]
    pub async fn list_incoming_phone_numbers(&self) -> Result<Vec<IncomingNumber>, SmsError> {
        let mut url = self.endpoint("IncomingPhoneNumbers.json");
        url.query_pairs_mut()
            .append_pair("PageSize", &self.page_size.to_string());

        let mut numbers = Vec::new();
        loop {
            let res = self
                .http
                .get(url.clone())
                .basic_auth(&self.account_sid, Some(&self.auth_token))
                .send()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;

            if !res.status().is_success() {
                return Err(error_from_response(res).await);
            }

            let page: IncomingPhoneNumberPage = res
                .json()
                .await
                .map_err(|e| SmsError::Unexpected(format!("phone number page: {}", e)))?;

            numbers.extend(page.incoming_phone_numbers.into_iter().map(IncomingNumber::from));

            match page.next_page_uri.as_deref() {
                Some(next) if !next.is_empty() => {
                    // next_page_uri is root-relative; keep our own path prefix and take its query
                    let next = self
                        .base_url
                        .join(next)
                        .map_err(|e| SmsError::Unexpected(format!("next page uri: {}", e)))?;
                    url = self.endpoint("IncomingPhoneNumbers.json");
                    url.set_query(next.query());
                }
                _ => break,
            }
        }

        debug!("Listed {} incoming phone numbers", numbers.len());
        Ok(numbers)
    }

    /// Create one outbound message.
    #[instrument(skip(self, req), fields(to = %req.to, from = %req.from, media = req.media_urls.len()))]
    pub async fn create_message(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let mut form: Vec<(&str, &str)> =
            vec![("To", req.to), ("From", req.from), ("Body", req.text)];
        for media in req.media_urls {
            form.push(("MediaUrl", media.as_str()));
        }

        let res = self
            .http
            .post(self.endpoint("Messages.json"))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        if !res.status().is_success() {
            let err = error_from_response(res).await;
            error!("Twilio message create failed: {}", err);
            return Err(err);
        }

        let raw_text = res
            .text()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;
        let raw_json: serde_json::Value = serde_json::from_str(&raw_text)
            .unwrap_or_else(|_| serde_json::json!({ "raw": raw_text }));

        let id = raw_json
            .get("sid")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(sms_core::fallback_id);

        info!("Message accepted by Twilio with sid {}", id);

        Ok(SendResponse {
            id,
            provider: PROVIDER,
            raw: raw_json,
        })
    }
}

#[async_trait]
impl SmsClient for TwilioClient {
    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        self.create_message(req).await
    }
}

#[async_trait]
impl PhoneNumberDirectory for TwilioClient {
    async fn incoming_phone_numbers(&self) -> Result<Vec<IncomingNumber>, SmsError> {
        self.list_incoming_phone_numbers().await
    }
}

/// Error body returned by the Twilio REST API.
#[derive(Debug, Clone, Deserialize)]
pub struct TwilioApiError {
    pub code: Option<u32>,
    pub message: String,
    pub more_info: Option<String>,
    pub status: Option<u16>,
}

async fn error_from_response(res: reqwest::Response) -> SmsError {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    match serde_json::from_str::<TwilioApiError>(&body) {
        Ok(api) if api.code == Some(AUTHENTICATION_ERROR_CODE) => SmsError::Auth(api.message),
        Ok(api) => match api.code {
            Some(code) => {
                SmsError::Provider(format!("HTTP {}: {} (code {})", status, api.message, code))
            }
            None => SmsError::Provider(format!("HTTP {}: {}", status, api.message)),
        },
        Err(_) if status == StatusCode::UNAUTHORIZED => {
            SmsError::Auth(format!("HTTP {}", status))
        }
        Err(_) => SmsError::Provider(format!("HTTP {}: {}", status, body)),
    }
}

#[derive(Debug, Deserialize)]
struct IncomingPhoneNumberPage {
    #[serde(default)]
    incoming_phone_numbers: Vec<IncomingPhoneNumberResource>,
    next_page_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncomingPhoneNumberResource {
    sid: String,
    phone_number: String,
    friendly_name: Option<String>,
}

impl From<IncomingPhoneNumberResource> for IncomingNumber {
    fn from(r: IncomingPhoneNumberResource) -> Self {
        let friendly_name = r
            .friendly_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| r.phone_number.clone());
        IncomingNumber {
            sid: r.sid,
            phone_number: r.phone_number,
            friendly_name,
        }
    }
}

/// Builds [`TwilioClient`]s from stored credentials.
#[derive(Debug, Clone)]
pub struct TwilioClientFactory {
    base_url: String,
    timeout: Duration,
    page_size: u32,
}

impl Default for TwilioClientFactory {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl TwilioClientFactory {
    pub fn new(base_url: impl Into<String>, timeout: Duration, page_size: u32) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            page_size,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client(&self, credentials: &Credentials) -> Result<TwilioClient, SmsError> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| SmsError::Http(e.to_string()))?;
        Ok(TwilioClient::with_base_url(
            credentials.account_sid.as_str(),
            credentials.auth_token.as_str(),
            &self.base_url,
        )?
        .with_http_client(http)
        .with_page_size(self.page_size))
    }
}

impl ClientFactory for TwilioClientFactory {
    fn build(&self, credentials: &Credentials) -> Result<Arc<dyn ProviderClient>, SmsError> {
        Ok(Arc::new(self.client(credentials)?))
    }
}
