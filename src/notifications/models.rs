use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body sent when no template is configured. Rendered with tera.
pub const DEFAULT_BODY_TEMPLATE: &str = r#"{"event": {{ event | json_encode() | safe }}, "service": {"id": {{ service_id }}, "name": {{ service_name | json_encode() | safe }}, "kind": {{ kind | json_encode() | safe }}, "target": {{ target | json_encode() | safe }}, "online": {{ online }}}}"#;

/// Where and how lifecycle events are pushed over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    pub url: String,
    /// `"POST"` or `"GET"`.
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    /// Tera template for POST bodies.
    #[serde(default)]
    pub body_template: Option<String>,
}

fn default_method() -> String {
    "POST".to_string()
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: None,
            body_template: None,
        }
    }

    pub fn body_template(&self) -> &str {
        self.body_template.as_deref().unwrap_or(DEFAULT_BODY_TEMPLATE)
    }
}
