use std::sync::Arc;

use axum::async_trait;
use bson::oid::ObjectId;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SupportMessage {
    pub subject: String,
    pub body: String,
    pub from_user: String,
}

impl SupportMessage {
    pub fn new(subject: String, body: String, from_user: ObjectId) -> Self {
        Self {
            subject: format!("EcoCollect Support: {subject}"),
            body,
            from_user: from_user.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification endpoint answered {0}")]
    Rejected(reqwest::StatusCode),
}

/// Delivers support messages. Fire and forget: a failed send is reported to
/// the caller and never retried.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_support_message(&self, message: &SupportMessage) -> Result<(), NotifyError>;
}

#[derive(Clone)]
pub struct NotifierState(pub Arc<dyn Notifier>);

impl std::ops::Deref for NotifierState {
    type Target = dyn Notifier;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl NotifierState {
    pub fn from_webhook(url: Option<String>) -> Self {
        match url {
            Some(url) => Self(Arc::new(WebhookNotifier::new(url))),
            None => Self(Arc::new(LogNotifier)),
        }
    }
}

/// Writes the message to the log instead of sending it anywhere.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_support_message(&self, message: &SupportMessage) -> Result<(), NotifyError> {
        tracing::info!(
            subject = %message.subject,
            from_user = %message.from_user,
            "support message received: {}",
            message.body
        );
        Ok(())
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_support_message(&self, message: &SupportMessage) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(message).send().await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status()));
        }

        tracing::debug!("support message delivered to webhook");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bson::oid::ObjectId;

    use super::{LogNotifier, Notifier, NotifierState, SupportMessage};

    #[test]
    fn test_subject_prefix() {
        let from = ObjectId::new();
        let message = SupportMessage::new("Missed pickup".into(), "body".into(), from);

        assert_eq!(message.subject, "EcoCollect Support: Missed pickup");
        assert_eq!(message.from_user, from.to_string());
    }

    #[tokio::test]
    async fn test_log_notifier_accepts() {
        let message = SupportMessage::new("hello".into(), "body".into(), ObjectId::new());
        LogNotifier.send_support_message(&message).await.unwrap();

        let state = NotifierState::from_webhook(None);
        state.send_support_message(&message).await.unwrap();
    }

    #[tokio::test]
    async fn test_webhook_failure_is_reported() {
        // nothing listens on the discard port
        let state = NotifierState::from_webhook(Some("http://127.0.0.1:9/support".into()));
        let message = SupportMessage::new("hello".into(), "body".into(), ObjectId::new());

        state
            .send_support_message(&message)
            .await
            .expect_err("unreachable webhook must fail");
    }
}
