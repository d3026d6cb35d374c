//! Discord REST adapter for [`OutputChannel`]
//!
//! Inline items are embeds (title = key title, footer = timestamp), listings
//! are single-file uploads. Editing an attachment item replaces its file.

use super::{ChannelItem, ItemId, MetricKey, OutputChannel, OutputItem, Rendering};
use crate::errors::SyncError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const API_BASE: &str = "https://discord.com/api/v10";

/// Discord caps history pages at 100 messages
const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiEmbed {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiAttachment {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: String,
    author: ApiUser,
    #[serde(default)]
    embeds: Vec<ApiEmbed>,
    #[serde(default)]
    attachments: Vec<ApiAttachment>,
}

impl ApiMessage {
    /// Tag from the last embed's title or from an attachment name
    fn tag(&self) -> Option<MetricKey> {
        self.embeds
            .last()
            .and_then(|e| e.title.as_deref())
            .and_then(MetricKey::from_title)
            .or_else(|| {
                self.attachments
                    .iter()
                    .find_map(|a| MetricKey::from_file_name(&a.filename))
            })
    }
}

pub struct DiscordChannel {
    http: reqwest::Client,
    token: String,
    channel_id: u64,
    self_id: String,
}

impl DiscordChannel {
    /// Resolve the bot identity and make sure the channel exists
    ///
    /// Errors here are startup errors: the engine must not run without its
    /// output channel.
    pub async fn connect(token: &str, channel_id: u64) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SyncError::Channel(e.to_string()))?;

        let mut channel = Self {
            http,
            token: token.to_string(),
            channel_id,
            self_id: String::new(),
        };

        let me: ApiUser = channel
            .call(channel.request(Method::GET, format!("{}/users/@me", API_BASE)))
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Channel(e.to_string()))?;
        channel.self_id = me.id;

        let check = channel
            .request(Method::GET, format!("{}/channels/{}", API_BASE, channel_id))
            .send()
            .await
            .map_err(|e| SyncError::Channel(e.to_string()))?;
        if !check.status().is_success() {
            return Err(SyncError::Channel(format!(
                "stats channel {} is not reachable ({})",
                channel_id,
                check.status()
            )));
        }

        log::info!("🔗 Output channel {} ready (bot user {})", channel_id, channel.self_id);
        Ok(channel)
    }

    fn messages_url(&self) -> String {
        format!("{}/channels/{}/messages", API_BASE, self.channel_id)
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("Authorization", format!("Bot {}", self.token))
    }

    async fn call(&self, request: RequestBuilder) -> Result<Response, SyncError> {
        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Channel(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(SyncError::Conflict("unknown message".to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(SyncError::Channel(format!("{}: {}", status, body)))
            }
        }
    }

    fn with_item(&self, request: RequestBuilder, item: &OutputItem) -> Result<RequestBuilder, SyncError> {
        match &item.rendering {
            Rendering::Inline { title, body, footer } => Ok(request.json(&json!({
                "content": "",
                "embeds": [{
                    "title": title,
                    "description": body,
                    "footer": { "text": footer },
                }],
                "attachments": [],
            }))),
            Rendering::Attachment {
                file_name,
                content,
                caption,
            } => {
                let payload = json!({
                    "content": caption,
                    "embeds": [],
                    "attachments": [{ "id": 0, "filename": file_name }],
                });
                let file = Part::bytes(content.clone().into_bytes())
                    .file_name(file_name.clone())
                    .mime_str("text/plain")
                    .map_err(|e| SyncError::Channel(e.to_string()))?;
                let form = Form::new()
                    .text("payload_json", payload.to_string())
                    .part("files[0]", file);
                Ok(request.multipart(form))
            }
        }
    }
}

fn parse_id(raw: &str) -> Result<ItemId, SyncError> {
    raw.parse()
        .map(ItemId)
        .map_err(|_| SyncError::Channel(format!("unexpected message id '{}'", raw)))
}

#[async_trait]
impl OutputChannel for DiscordChannel {
    async fn history(&self, limit: usize) -> Result<Vec<ChannelItem>, SyncError> {
        let mut items = Vec::with_capacity(limit);
        let mut before: Option<String> = None;

        while items.len() < limit {
            let page_size = (limit - items.len()).min(PAGE_SIZE);
            let mut url = format!("{}?limit={}", self.messages_url(), page_size);
            if let Some(id) = &before {
                url.push_str(&format!("&before={}", id));
            }

            let page: Vec<ApiMessage> = self
                .call(self.request(Method::GET, url))
                .await?
                .json()
                .await
                .map_err(|e| SyncError::Channel(e.to_string()))?;

            let exhausted = page.len() < page_size;
            before = page.last().map(|m| m.id.clone());

            for message in &page {
                items.push(ChannelItem {
                    id: parse_id(&message.id)?,
                    from_self: message.author.id == self.self_id,
                    tag: message.tag(),
                });
            }

            if exhausted || before.is_none() {
                break;
            }
        }

        Ok(items)
    }

    async fn send(&self, item: &OutputItem) -> Result<ItemId, SyncError> {
        let request = self.with_item(self.request(Method::POST, self.messages_url()), item)?;
        let created: Value = self
            .call(request)
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Channel(e.to_string()))?;

        let id = created
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::Channel("created message without id".to_string()))?;
        parse_id(id)
    }

    async fn edit(&self, id: ItemId, item: &OutputItem) -> Result<(), SyncError> {
        let url = format!("{}/{}", self.messages_url(), id);
        let request = self.with_item(self.request(Method::PATCH, url), item)?;
        self.call(request).await.map_err(|e| match e {
            SyncError::Conflict(_) => SyncError::Conflict(id.to_string()),
            other => other,
        })?;
        Ok(())
    }

    async fn delete(&self, id: ItemId) -> Result<(), SyncError> {
        let url = format!("{}/{}", self.messages_url(), id);
        self.call(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn purge_own(&self, limit: usize) -> Result<usize, SyncError> {
        let own: Vec<ItemId> = self
            .history(limit)
            .await?
            .into_iter()
            .filter(|item| item.from_self)
            .map(|item| item.id)
            .collect();

        let mut removed = 0;
        for id in own {
            match self.delete(id).await {
                Ok(()) => removed += 1,
                Err(SyncError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(json: &str) -> ApiMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_tag_from_embed_title() {
        let m = message(r#"{"id": "1", "author": {"id": "9"}, "embeds": [{"title": "Tick"}]}"#);
        assert_eq!(m.tag(), Some(MetricKey::Tick));

        let m = message(r#"{"id": "1", "author": {"id": "9"}, "embeds": [{"title": "Scores"}]}"#);
        assert_eq!(m.tag(), Some(MetricKey::MinMax));
    }

    #[test]
    fn test_tag_from_attachment_name() {
        let m = message(
            r#"{"id": "2", "author": {"id": "9"}, "attachments": [{"filename": "revenues_1760700000.txt"}]}"#,
        );
        assert_eq!(m.tag(), Some(MetricKey::Revenues));
    }

    #[test]
    fn test_untagged_message() {
        let m = message(r#"{"id": "3", "author": {"id": "9"}, "content": "hello"}"#);
        assert_eq!(m.tag(), None);
        assert_eq!(parse_id(&m.id).unwrap(), ItemId(3));
        assert!(parse_id("abc").is_err());
    }
}
