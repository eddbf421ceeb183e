//! Published description and call validation for the `send_message` action.
//!
//! [`action_schema`] is a pure function of the aggregate sender list, so the
//! dispatcher can regenerate it after every registry change.

use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::{ATTR_FROM_NUMBER, ATTR_MEDIA_URL, ATTR_MESSAGE, ATTR_TARGET};
use crate::template::TemplateValue;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid action data: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("target must contain at least one entry")]
    NoTargets,
    #[error("from_number {0} is not one of the configured numbers")]
    FromNumberNotAllowed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    Text {
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        multiple: bool,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        multiline: bool,
    },
    Select {
        options: Vec<String>,
        custom_value: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<&'static str>,
    pub selector: Selector,
}

/// Validation applied to `from_number`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FromNumberConstraint {
    OneOf(Vec<String>),
    /// No numbers known yet: accept any string and let the dispatcher reject it.
    #[default]
    AnyString,
}

impl FromNumberConstraint {
    pub fn allows(&self, number: &str) -> bool {
        match self {
            FromNumberConstraint::OneOf(numbers) => numbers.iter().any(|n| n == number),
            FromNumberConstraint::AnyString => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub fields: Vec<FieldSpec>,
    #[serde(skip)]
    pub from_number: FromNumberConstraint,
}

const MEDIA_URL_DESCRIPTION: &str = "URL(s) for MMS media attachments. Twilio fetches media from these URLs, \
so they must be publicly accessible.\n\n\
**External URLs:** Use any public URL (https://example.com/image.jpg).\n\n\
**Local files:** Use /local/filename.jpg for files in the www folder. \
Auto-converts to your external URL.\n\n\
**Requirements:** The host must be externally accessible. \
Supported paths: /local/, /media/, /api/. Supports templates.";

/// Build the action description for the given sender numbers.
pub fn action_schema(phone_numbers: &[String]) -> ActionSchema {
    let from_number = if phone_numbers.is_empty() {
        FromNumberConstraint::AnyString
    } else {
        FromNumberConstraint::OneOf(phone_numbers.to_vec())
    };

    ActionSchema {
        name: "Send Message",
        description: "Send an SMS or MMS message via Twilio. Supports templates.",
        fields: vec![
            FieldSpec {
                key: ATTR_TARGET,
                name: "Target Numbers",
                description: "Phone number(s) to send to. Supports templates.",
                required: true,
                example: Some("+15551234567"),
                selector: Selector::Text {
                    multiple: true,
                    multiline: false,
                },
            },
            FieldSpec {
                key: ATTR_MESSAGE,
                name: "Message",
                description: "Message body. Supports templates.",
                required: true,
                example: Some(
                    "Version: {{ state_attr('update.core_update', 'installed_version') }}",
                ),
                selector: Selector::Text {
                    multiple: false,
                    multiline: true,
                },
            },
            FieldSpec {
                key: ATTR_MEDIA_URL,
                name: "Media URL",
                description: MEDIA_URL_DESCRIPTION,
                required: false,
                example: Some("/local/camera_snapshot.jpg"),
                selector: Selector::Text {
                    multiple: true,
                    multiline: false,
                },
            },
            FieldSpec {
                key: ATTR_FROM_NUMBER,
                name: "From Number",
                description: "The Twilio phone number to send from.",
                required: true,
                example: None,
                selector: Selector::Select {
                    options: phone_numbers.to_vec(),
                    custom_value: false,
                },
            },
        ],
        from_number,
    }
}

/// Validated `send_message` call data.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SendMessageParams {
    #[serde(rename = "target", deserialize_with = "one_or_many")]
    pub targets: Vec<TemplateValue>,
    pub message: TemplateValue,
    #[serde(rename = "media_url", default, deserialize_with = "one_or_many")]
    pub media_urls: Vec<TemplateValue>,
    pub from_number: String,
}

impl SendMessageParams {
    pub fn new(
        targets: Vec<TemplateValue>,
        message: impl Into<TemplateValue>,
        from_number: impl Into<String>,
    ) -> Self {
        Self {
            targets,
            message: message.into(),
            media_urls: Vec::new(),
            from_number: from_number.into(),
        }
    }

    pub fn with_media(mut self, media_urls: Vec<TemplateValue>) -> Self {
        self.media_urls = media_urls;
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(TemplateValue),
    Many(Vec<TemplateValue>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<TemplateValue>, D::Error> {
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}

impl ActionSchema {
    /// Validate raw call data against this schema.
    pub fn parse_call(&self, data: &serde_json::Value) -> Result<SendMessageParams, SchemaError> {
        let params = SendMessageParams::deserialize(data)?;
        if params.targets.is_empty() {
            return Err(SchemaError::NoTargets);
        }
        if !self.from_number.allows(&params.from_number) {
            return Err(SchemaError::FromNumberNotAllowed(params.from_number));
        }
        Ok(params)
    }

    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }
}
