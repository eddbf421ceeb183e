//! Names shared between the setup flows, the dispatcher and the host.

pub const DOMAIN: &str = "twilio_sms_ui";
pub const SERVICE_SEND_MESSAGE: &str = "send_message";
pub const DEFAULT_TITLE: &str = "Twilio SMS";

// Configuration keys
pub const CONF_ACCOUNT_SID: &str = "account_sid";
pub const CONF_AUTH_TOKEN: &str = "auth_token";
pub const CONF_PHONE_NUMBERS: &str = "phone_numbers";
pub const CONF_EXTERNAL_URL: &str = "external_url";
pub const CONF_DEBUG: &str = "debug";

// Action attributes
pub const ATTR_TARGET: &str = "target";
pub const ATTR_MESSAGE: &str = "message";
pub const ATTR_MEDIA_URL: &str = "media_url";
pub const ATTR_FROM_NUMBER: &str = "from_number";

/// Locally served paths that can be rewritten onto an external base URL.
pub const LOCAL_PATH_PREFIXES: [&str; 3] = ["/local/", "/media/", "/api/"];
