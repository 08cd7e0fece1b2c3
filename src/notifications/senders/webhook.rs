use async_trait::async_trait;
use reqwest::{Client, Method, header};
use tera::{Context, Tera};

use super::{SenderError, ServiceEvent, ServiceNotifier};
use crate::db::models::Service;
use crate::notifications::models::WebhookConfig;
use crate::version::user_agent;

/// Pushes lifecycle events to a custom webhook.
pub struct WebhookNotifier {
    client: Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Result<Self, SenderError> {
        parse_method(&config.method)?;
        let client = Client::builder().user_agent(user_agent()).build()?;
        Ok(Self { client, config })
    }

    /// Renders the POST body for `event`.
    pub fn render_body(&self, event: ServiceEvent, service: &Service) -> Result<String, SenderError> {
        let mut context = Context::new();
        context.insert("event", event.as_str());
        context.insert("service_id", &service.id);
        context.insert("service_name", &service.name);
        context.insert("kind", service.kind.as_str());
        context.insert("target", &service.target);
        context.insert("online", &service.online);
        Ok(Tera::one_off(self.config.body_template(), &context, true)?)
    }

    fn headers(&self) -> Result<header::HeaderMap, SenderError> {
        let mut header_map = header::HeaderMap::new();
        for (key, value) in self.config.headers.iter().flatten() {
            let header_name = header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| SenderError::InvalidConfiguration(format!("Invalid header name: {e}")))?;
            let header_value = header::HeaderValue::from_str(value)
                .map_err(|e| SenderError::InvalidConfiguration(format!("Invalid header value: {e}")))?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }
}

fn parse_method(method: &str) -> Result<Method, SenderError> {
    match method.to_uppercase().as_str() {
        "POST" => Ok(Method::POST),
        "GET" => Ok(Method::GET),
        _ => Err(SenderError::InvalidConfiguration(format!(
            "Unsupported HTTP method: {method}"
        ))),
    }
}

#[async_trait]
impl ServiceNotifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, event: ServiceEvent, service: &Service) -> Result<(), SenderError> {
        let method = parse_method(&self.config.method)?;
        let mut request_builder = self
            .client
            .request(method.clone(), &self.config.url)
            .headers(self.headers()?);

        if method == Method::POST {
            let rendered_body = self.render_body(event, service)?;
            request_builder = request_builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(rendered_body);
        } else {
            request_builder = request_builder.query(&[
                ("event", event.as_str().to_string()),
                ("service_id", service.id.to_string()),
            ]);
        }

        let response = request_builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Webhook returned non-success status: {status}. Body: {error_body}"
            )));
        }

        Ok(())
    }
}
