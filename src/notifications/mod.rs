//! Lifecycle notifications: the notifier plugin interface, the webhook
//! implementation and the fire-and-forget dispatcher.

pub mod dispatcher;
pub mod models;
pub mod senders;

pub use dispatcher::NotificationDispatcher;
pub use models::WebhookConfig;
pub use senders::{SenderError, ServiceEvent, ServiceNotifier, webhook::WebhookNotifier};
