// Chat notification sink backed by the Telegram Bot HTTP API

use crate::error::NotifyError;
use async_trait::async_trait;
use pawsense_core::TelegramConfig;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const TEXT_TIMEOUT: Duration = Duration::from_secs(10);
pub const MEDIA_TIMEOUT: Duration = Duration::from_secs(15);
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);
/// Server-side wait of one `getUpdates` long-poll
pub const POLL_TIMEOUT_SECS: u64 = 25;
const MAX_CAPTION_CHARS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Markdown,
    Plain,
}

/// Best-effort delivery to the owner chat. Callers treat an error as
/// "not delivered" and never retry on their own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, text: &str, mode: ParseMode) -> Result<(), NotifyError>;

    async fn send_image(&self, path: &Path, caption: &str) -> Result<(), NotifyError>;

    async fn send_video(&self, path: &Path, caption: &str) -> Result<(), NotifyError>;
}

/// Conversation with whoever wrote to the bot, as opposed to the owner chat
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_message_to(&self, chat_id: &str, text: &str, mode: ParseMode) -> Result<(), NotifyError>;

    async fn send_photo_to(&self, chat_id: &str, path: &Path, caption: &str) -> Result<(), NotifyError>;

    /// Fetch an attachment into `dest`, returning the byte count
    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<u64, NotifyError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub video: Option<VideoAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoAttachment {
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    file_url: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// Create a new notifier for `chat_id` against the public API
    pub fn new(token: &str, chat_id: impl Into<String>) -> Self {
        Self::with_api_base(DEFAULT_API_BASE, token, chat_id)
    }

    pub fn with_api_base(api_base: &str, token: &str, chat_id: impl Into<String>) -> Self {
        let api_base = api_base.trim_end_matches('/');
        Self {
            client: Client::new(),
            base_url: format!("{}/bot{}", api_base, token),
            file_url: format!("{}/file/bot{}", api_base, token),
            chat_id: chat_id.into(),
        }
    }

    /// None when the token or the chat id is missing
    pub fn from_config(config: &TelegramConfig) -> Option<Self> {
        match (&config.token, &config.chat_id) {
            (Some(token), Some(chat_id)) if config.is_configured() => {
                let api_base = config.api_base.as_deref().unwrap_or(DEFAULT_API_BASE);
                Some(Self::with_api_base(api_base, token, chat_id.clone()))
            }
            _ => None,
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Verify the token
    pub async fn get_me(&self) -> Result<String, NotifyError> {
        let url = format!("{}/getMe", self.base_url);
        let response = self.client.get(&url).timeout(TEXT_TIMEOUT).send().await?;
        let result = check_response(response).await?;
        Ok(result["result"]["username"]
            .as_str()
            .unwrap_or("unknown")
            .to_string())
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, NotifyError> {
        let url = format!("{}/getUpdates", self.base_url);
        let mut query = vec![
            ("timeout", POLL_TIMEOUT_SECS.to_string()),
            ("allowed_updates", "[\"message\"]".to_string()),
        ];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }
        let response = self
            .client
            .get(&url)
            .query(&query)
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS) + TEXT_TIMEOUT)
            .send()
            .await?;
        let result = check_response(response).await?;
        serde_json::from_value(result["result"].clone())
            .map_err(|e| NotifyError::Api(format!("Malformed updates: {}", e)))
    }

    /// Send to any chat; used for command replies
    pub async fn send_message_to(&self, chat_id: &str, text: &str, mode: ParseMode) -> Result<(), NotifyError> {
        let url = format!("{}/sendMessage", self.base_url);
        let mut payload = serde_json::json!({ "chat_id": chat_id, "text": text });
        if mode == ParseMode::Markdown {
            payload["parse_mode"] = serde_json::Value::from("Markdown");
        }
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .timeout(TEXT_TIMEOUT)
            .send()
            .await?;
        check_response(response).await?;
        debug!("Message delivered to chat {}", chat_id);
        Ok(())
    }

    /// Resolve an attachment id to its download path on the file server
    pub async fn get_file(&self, file_id: &str) -> Result<String, NotifyError> {
        let url = format!("{}/getFile", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("file_id", file_id)])
            .timeout(TEXT_TIMEOUT)
            .send()
            .await?;
        let result = check_response(response).await?;
        result["result"]["file_path"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| NotifyError::Api(format!("No file path for {}", file_id)))
    }

    async fn send_media(
        &self,
        chat_id: &str,
        method: &str,
        field: &str,
        path: &Path,
        caption: &str,
    ) -> Result<(), NotifyError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", truncate_caption(caption))
            .text("parse_mode", "Markdown")
            .part(field.to_string(), Part::bytes(bytes).file_name(file_name));

        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(MEDIA_TIMEOUT)
            .send()
            .await?;
        check_response(response).await?;
        info!("{} delivered: {}", method, path.display());
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_text(&self, text: &str, mode: ParseMode) -> Result<(), NotifyError> {
        self.send_message_to(&self.chat_id, text, mode).await
    }

    async fn send_image(&self, path: &Path, caption: &str) -> Result<(), NotifyError> {
        self.send_media(&self.chat_id, "sendPhoto", "photo", path, caption).await
    }

    async fn send_video(&self, path: &Path, caption: &str) -> Result<(), NotifyError> {
        self.send_media(&self.chat_id, "sendVideo", "video", path, caption).await
    }
}

#[async_trait]
impl ChatApi for TelegramNotifier {
    async fn send_message_to(&self, chat_id: &str, text: &str, mode: ParseMode) -> Result<(), NotifyError> {
        TelegramNotifier::send_message_to(self, chat_id, text, mode).await
    }

    async fn send_photo_to(&self, chat_id: &str, path: &Path, caption: &str) -> Result<(), NotifyError> {
        self.send_media(chat_id, "sendPhoto", "photo", path, caption).await
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<u64, NotifyError> {
        let file_path = self.get_file(file_id).await?;
        let url = format!("{}/{}", self.file_url, file_path);
        let response = self.client.get(&url).timeout(DOWNLOAD_TIMEOUT).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Api(format!("HTTP {} downloading {}", status, file_path)));
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes).await?;
        debug!("Downloaded {} ({} bytes)", file_path, bytes.len());
        Ok(bytes.len() as u64)
    }
}

async fn check_response(response: reqwest::Response) -> Result<serde_json::Value, NotifyError> {
    let status = response.status();
    let result: serde_json::Value = response.json().await?;
    if !status.is_success() || !result["ok"].as_bool().unwrap_or(false) {
        return Err(NotifyError::Api(format!(
            "HTTP {}: {}",
            status,
            result["description"].as_str().unwrap_or("Unknown")
        )));
    }
    Ok(result)
}

/// Captions are limited by the bot API
pub fn truncate_caption(caption: &str) -> String {
    if caption.chars().count() <= MAX_CAPTION_CHARS {
        return caption.to_string();
    }
    let mut truncated: String = caption.chars().take(MAX_CAPTION_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}
