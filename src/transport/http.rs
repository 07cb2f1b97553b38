//! REST client for the notes backend
//!
//! Covers the calls the chat session needs (note confirmation, clear
//! history) and the notes collection read used to refresh the notes list
//! after the assistant created a note.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ServerConfig;
use crate::core::NotesApi;

/// A note as returned by the notes collection endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Text", default)]
    pub text: String,
    #[serde(rename = "CreatedAt", default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct HttpNotesApi {
    client: reqwest::Client,
    server: ServerConfig,
}

impl HttpNotesApi {
    pub fn new(server: ServerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(server.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, server })
    }

    /// Fetch the whole notes collection
    pub async fn list_notes(&self) -> Result<Vec<Note>> {
        let url = self.server.api_url("")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch notes")?;
        let response = check_status(response).await?;
        response.json().await.context("Invalid notes response")
    }

    async fn post(&self, url: url::Url) -> Result<()> {
        let response = self
            .client
            .post(url.clone())
            .send()
            .await
            .with_context(|| format!("POST {} failed", url.path()))?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("HTTP {}: {}", status, body.trim())
}

#[async_trait]
impl NotesApi for HttpNotesApi {
    async fn confirm_creation(&self, chat_id: &str, confirmed: bool) -> Result<()> {
        let mut url = self.server.api_url("/ai/note-chat/confirm-creation")?;
        url.query_pairs_mut()
            .append_pair("chatId", chat_id)
            .append_pair("confirmed", if confirmed { "true" } else { "false" });
        tracing::debug!(chat_id, confirmed, "sending note confirmation");
        self.post(url).await
    }

    async fn clear_history(&self, chat_id: &str) -> Result<()> {
        let mut url = self.server.api_url("/ai/note-chat/clear")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Base URL cannot carry a path"))?
            .push(chat_id);
        tracing::debug!(chat_id, "clearing chat history");
        self.post(url).await
    }
}
