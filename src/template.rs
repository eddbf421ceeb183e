//! Template-or-literal action inputs.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::host::TemplateRenderer;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to render template `{template}`: {reason}")]
    Failed { template: String, reason: String },
}

/// An action input that is either used verbatim or rendered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    Literal(String),
    Template(String),
}

/// Whether a string contains template markup.
pub fn is_template_string(s: &str) -> bool {
    s.contains("{{") || s.contains("{%") || s.contains("{#")
}

impl TemplateValue {
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        if is_template_string(&source) {
            TemplateValue::Template(source)
        } else {
            TemplateValue::Literal(source)
        }
    }

    pub fn source(&self) -> &str {
        match self {
            TemplateValue::Literal(s) | TemplateValue::Template(s) => s,
        }
    }

    pub fn render(&self, renderer: &dyn TemplateRenderer) -> Result<String, RenderError> {
        match self {
            TemplateValue::Literal(s) => Ok(s.clone()),
            TemplateValue::Template(source) => renderer.render(source),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(s: &str) -> Self {
        TemplateValue::parse(s)
    }
}

impl Serialize for TemplateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.source())
    }
}

impl<'de> Deserialize<'de> for TemplateValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(TemplateValue::parse)
    }
}
