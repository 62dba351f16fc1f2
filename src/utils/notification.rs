use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::config::NotifyConfig;

/// Result type for notification operations
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur while delivering a notification
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mail endpoint rejected the message with status {0}")]
    Rejected(u16),
}

/// Emitted once a new request has been stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCreated {
    pub request_id: Uuid,
    pub title: String,
    pub description: String,
    pub business_justification: Option<String>,
    pub requested_by: Option<String>,
    pub submitted_by: String,
    pub category_name: Option<String>,
    pub attachment_count: usize,
    pub submitted_at: DateTime<Utc>,
}

/// Best-effort delivery of lifecycle events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &RequestCreated) -> NotificationResult<()>;
}

/// Used when no mail endpoint is configured.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, event: &RequestCreated) -> NotificationResult<()> {
        info!(
            request_id = %event.request_id,
            title = %event.title,
            "New feature request submitted (no mail endpoint configured)"
        );
        Ok(())
    }
}

/// Mail message builder
pub struct MailBuilder {
    subject: String,
    html_body: String,
    recipient: Option<String>,
    sender_email: Option<String>,
    sender_alias: String,
}

impl MailBuilder {
    /// Create a new mail with a subject line
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            html_body: String::new(),
            recipient: None,
            sender_email: None,
            sender_alias: "Feature Requests".to_string(),
        }
    }

    /// Set the HTML body
    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.html_body = body.into();
        self
    }

    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn sender_email(mut self, sender: Option<String>) -> Self {
        self.sender_email = sender;
        self
    }

    /// Render the JSON payload accepted by the mail endpoint
    pub fn build(self) -> serde_json::Value {
        json!({
            "subject": self.subject,
            "body": self.html_body,
            "is_html": true,
            "recipient_email": self.recipient,
            "sender_email": self.sender_email,
            "sender_alias": self.sender_alias,
        })
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' => out.push_str("<br>"),
            _ => out.push(c),
        }
    }
    out
}

/// HTML summary of a new request, with a link back to it when `app_url` is known.
pub fn render_request_created(event: &RequestCreated, app_url: Option<&str>) -> String {
    let mut html = String::from("<div style=\"font-family: Arial, sans-serif; max-width: 600px;\">");
    html.push_str("<h2>New feature request submitted</h2>");
    html.push_str(&format!("<h3>{}</h3>", escape_html(&event.title)));
    if let Some(category) = &event.category_name {
        html.push_str(&format!("<p><strong>Category:</strong> {}</p>", escape_html(category)));
    }
    if let Some(requested_by) = &event.requested_by {
        html.push_str(&format!(
            "<p><strong>Requested by:</strong> {}</p>",
            escape_html(requested_by)
        ));
    }
    html.push_str(&format!(
        "<p><strong>Submitted by:</strong> {}</p>",
        escape_html(&event.submitted_by)
    ));
    html.push_str(&format!(
        "<p><strong>Description:</strong></p><div>{}</div>",
        escape_html(&event.description)
    ));
    if let Some(justification) = &event.business_justification {
        html.push_str(&format!(
            "<p><strong>Business justification:</strong></p><div>{}</div>",
            escape_html(justification)
        ));
    }
    if event.attachment_count > 0 {
        html.push_str(&format!(
            "<p><strong>Attachments:</strong> {} file(s)</p>",
            event.attachment_count
        ));
    }
    html.push_str(&format!(
        "<p><strong>Submitted at:</strong> {}</p>",
        event.submitted_at.format("%Y-%m-%d %H:%M UTC")
    ));
    if let Some(url) = app_url {
        html.push_str(&format!(
            "<p><a href=\"{}/dashboard/request/{}\">View request</a></p>",
            url.trim_end_matches('/'),
            event.request_id
        ));
    }
    html.push_str("</div>");
    html
}

/// Posts new-request mails to an HTTP mail endpoint.
pub struct EmailNotifier {
    client: reqwest::Client,
    config: NotifyConfig,
    app_url: Option<String>,
}

impl EmailNotifier {
    pub fn new(config: NotifyConfig, app_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            app_url,
        }
    }

    fn sender_email(&self) -> Option<String> {
        let url = reqwest::Url::parse(self.app_url.as_deref()?).ok()?;
        let host = url.host_str().filter(|host| !host.is_empty())?;
        Some(format!("noreply@{host}"))
    }
}

#[async_trait]
impl NotificationSink for EmailNotifier {
    async fn notify(&self, event: &RequestCreated) -> NotificationResult<()> {
        let mail = MailBuilder::new(format!("New feature request: {}", event.title))
            .html_body(render_request_created(event, self.app_url.as_deref()))
            .recipient(self.config.recipient.clone())
            .sender_email(self.sender_email())
            .build();

        let mut request = self.client.post(&self.config.endpoint).json(&mail);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(NotificationError::Rejected(response.status().as_u16()));
        }
        info!(request_id = %event.request_id, "📧 New request notification sent");
        Ok(())
    }
}
