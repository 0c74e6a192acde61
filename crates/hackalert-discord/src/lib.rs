//! Discord REST sink: bot login check, channel lookup and message posting.

use std::time::Duration;

use async_trait::async_trait;
use hackalert_core::{MessageSink, Notification, SinkError};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

pub const API_BASE: &str = "https://discord.com/api/v10";
const USER_AGENT: &str = concat!("DiscordBot (hackalert, ", env!("CARGO_PKG_VERSION"), ")");

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BotUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
}

impl BotUser {
    /// `name#1234` for legacy accounts, the bare username otherwise.
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(discriminator) if discriminator != "0" => {
                format!("{}#{}", self.username, discriminator)
            }
            _ => self.username.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Clone)]
pub struct DiscordClient {
    http: Client,
    api_base: String,
    token: String,
}

impl DiscordClient {
    pub fn new(token: impl Into<String>) -> Result<Self, SinkError> {
        Self::with_api_base(token, API_BASE)
    }

    pub fn with_api_base(
        token: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, SinkError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(USER_AGENT)
            .build()
            .map_err(transport)?;
        Ok(Self {
            http,
            api_base: api_base.into(),
            token: token.into(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base.trim_end_matches('/'), path))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
    }

    /// Verifies the token by fetching the bot's own user.
    pub async fn login(&self) -> Result<BotUser, SinkError> {
        let response = self
            .request(reqwest::Method::GET, "/users/@me")
            .send()
            .await
            .map_err(transport)?;
        let user: BotUser = check(response).await?.json().await.map_err(transport)?;
        info!(bot = %user.tag(), "bot is ready and logged in");
        Ok(user)
    }

    /// Resolves the target channel once; missing or hidden channels are fatal to startup.
    pub async fn channel(&self, channel_id: &str) -> Result<DiscordChannel, SinkError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/channels/{channel_id}"))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status().as_u16();
        if status == 403 || status == 404 {
            return Err(SinkError::ChannelNotFound(channel_id.to_string()));
        }

        let channel: ChannelInfo = check(response).await?.json().await.map_err(transport)?;
        info!(
            channel_id = %channel.id,
            channel = channel.name.as_deref().unwrap_or("<unnamed>"),
            "announcement channel resolved"
        );
        Ok(DiscordChannel {
            client: self.clone(),
            id: channel.id,
            name: channel.name,
        })
    }
}

#[derive(Clone)]
pub struct DiscordChannel {
    client: DiscordClient,
    id: String,
    name: Option<String>,
}

impl DiscordChannel {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

#[async_trait]
impl MessageSink for DiscordChannel {
    async fn send(&self, notification: &Notification) -> Result<(), SinkError> {
        let response = self
            .client
            .request(reqwest::Method::POST, &format!("/channels/{}/messages", self.id))
            .json(&message_payload(notification))
            .send()
            .await
            .map_err(transport)?;
        check(response).await?;
        Ok(())
    }
}

fn message_payload(notification: &Notification) -> Value {
    match notification {
        Notification::Text(content) => json!({ "content": content }),
        Notification::Embed(embed) => json!({ "embeds": [embed] }),
    }
}

async fn check(response: Response) -> Result<Response, SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), body))
}

fn status_error(status: u16, body: String) -> SinkError {
    match status {
        429 => SinkError::RateLimited,
        401 => SinkError::Unauthorized(body),
        _ => SinkError::Http { status, body },
    }
}

fn transport(err: reqwest::Error) -> SinkError {
    SinkError::Transport(err.to_string())
}
