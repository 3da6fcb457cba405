//! Discord webhook client
//!
//! Sends each post as one webhook message: the author as webhook username and
//! avatar, the caption in an embed, and the composed pages as attachments.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::NotificationChannel;
use crate::error::{SyncError, SyncResult};
use crate::types::{DeliveryReference, OutgoingPost, RetractOutcome};

const WEBHOOK_PATH: &str = "/api/webhooks/";

/// Discord webhook destination
#[derive(Clone)]
pub struct DiscordWebhook {
    id: String,
    url: Url,
    http: Client,
}

impl DiscordWebhook {
    /// Create a client from a `https://discord.com/api/webhooks/<id>/<token>` URL
    pub fn from_url(url: &str, timeout: Duration) -> SyncResult<Self> {
        let invalid = || SyncError::Api {
            status: 0,
            message: format!("not a Discord webhook URL: {}", url),
        };

        let mut url = Url::parse(url.trim()).map_err(|_| invalid())?;
        let path = url.path().trim_end_matches('/').to_string();
        let id = parse_webhook_id(&path).ok_or_else(invalid)?.to_string();
        url.set_path(&path);

        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self { id, url, http })
    }

    /// Execute URL, keeping any query the webhook was configured with
    fn send_url(&self) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("wait", "true");
        url
    }

    fn message_url(&self, reference: &DeliveryReference) -> Url {
        let mut url = self.url.clone();
        url.set_path(&format!("{}/messages/{}", self.url.path(), reference));
        url
    }
}

/// Webhook id segment of a webhook URL path
fn parse_webhook_id(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(WEBHOOK_PATH)?;
    let mut segments = rest.split('/');
    let id = segments.next()?;
    let token = segments.next()?;

    (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) && !token.is_empty()).then_some(id)
}

#[async_trait]
impl NotificationChannel for DiscordWebhook {
    fn channel_id(&self) -> &str {
        &self.id
    }

    async fn send(&self, post: &OutgoingPost) -> SyncResult<DeliveryReference> {
        let payload = WebhookPayload::from_post(post);
        let mut form = Form::new().text("payload_json", serde_json::to_string(&payload)?);

        for (index, path) in post.files.iter().enumerate() {
            let data = tokio::fs::read(path).await?;
            let part = Part::bytes(data).file_name(attachment_name(index, path));
            form = form.part(format!("files[{}]", index), part);
        }

        debug!(
            "Sending webhook message for {} with {} files",
            post.author_name,
            post.files.len()
        );

        let response = self
            .http
            .post(self.send_url())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("Webhook send failed: {} - {}", status, message);
            return Err(SyncError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let message: WebhookMessage = response.json().await?;
        info!("Webhook message {} sent", message.id);
        Ok(DeliveryReference(message.id))
    }

    async fn retract(&self, reference: &DeliveryReference) -> SyncResult<RetractOutcome> {
        let response = self.http.delete(self.message_url(reference)).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                warn!("Webhook message {} already gone", reference);
                Ok(RetractOutcome::NotFound)
            }
            status if status.is_success() => {
                info!("Webhook message {} deleted", reference);
                Ok(RetractOutcome::Retracted)
            }
            status => Err(SyncError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

/// Upload name for the page at `index`, keeping the source extension
fn attachment_name(index: usize, path: &Path) -> String {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("page{}.{}", index, ext),
        None => format!("page{}", index),
    }
}

/// Escape Discord markdown so captions render literally
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '~' | '`' | '|' | '>' | '#' | '-' | '[' | ']') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// =============================================================================
// Webhook Payload Types
// =============================================================================

#[derive(Debug, Serialize)]
struct WebhookPayload {
    username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<String>,
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    description: String,
    timestamp: String,
    author: EmbedAuthor,
}

#[derive(Debug, Serialize)]
struct EmbedAuthor {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<String>,
}

impl WebhookPayload {
    fn from_post(post: &OutgoingPost) -> Self {
        Self {
            username: post.author_name.clone(),
            avatar_url: post.author_icon_url.clone(),
            embeds: vec![Embed {
                description: escape_markdown(&post.caption),
                timestamp: post.timestamp.to_rfc3339(),
                author: EmbedAuthor {
                    name: post.author_name.clone(),
                    icon_url: post.author_icon_url.clone(),
                },
            }],
        }
    }
}

/// Message object returned with `?wait=true`
#[derive(Debug, Deserialize)]
struct WebhookMessage {
    id: String,
}
