use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use crate::backend::error::{ChatError, Result};

const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const VIDEO_ID_LEN: usize = 11;
const CHANNEL_ID_LEN: usize = 24;

/// What the user typed into the YouTube field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoInput {
    /// A video id taken from a URL or given literally
    Video(String),
    /// A channel id (`UC…`) or a handle/name to search for, without `@`
    Channel(String),
}

impl VideoInput {
    /// Classify trimmed user input. `None` for empty input.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        if let Some(id) = video_id_from_url(input) {
            return Some(VideoInput::Video(id));
        }

        if input.chars().count() == VIDEO_ID_LEN && !input.starts_with('@') {
            return Some(VideoInput::Video(input.to_string()));
        }

        let channel = input.strip_prefix('@').unwrap_or(input);
        Some(VideoInput::Channel(channel.to_string()))
    }
}

/// `v` from a watch URL, or the path of a short link
fn video_id_from_url(input: &str) -> Option<String> {
    if input.contains("youtube.com/watch") {
        let url = if input.contains("://") {
            Url::parse(input)
        } else {
            Url::parse(&format!("https://{}", input))
        }
        .ok()?;

        return url
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
            .filter(|v| !v.is_empty());
    }

    let (_, rest) = input.split_once("youtu.be/")?;
    let id = rest.split('?').next().unwrap_or(rest);
    (!id.is_empty()).then(|| id.to_string())
}

pub fn is_channel_id(value: &str) -> bool {
    value.starts_with("UC") && value.len() == CHANNEL_ID_LEN
}

/// Supplies a YouTube Data API key when one is needed and none is stored
#[async_trait]
pub trait ApiKeyProvider: Send + Sync {
    async fn request_api_key(&self) -> Option<String>;
}

/// Channel and live-broadcast lookups
#[async_trait]
pub trait LiveVideoSearch: Send + Sync {
    /// Channel id for a channel name or handle
    async fn find_channel_id(&self, name: &str, api_key: &str) -> Result<Option<String>>;

    /// Id of the broadcast currently live on `channel_id`
    async fn find_live_video(&self, channel_id: &str, api_key: &str) -> Result<Option<String>>;
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    id: SearchId,
    snippet: Option<Snippet>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: Option<String>,
    channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    channel_id: Option<String>,
}

impl SearchResponse {
    fn first_channel_id(self) -> Option<String> {
        let item = self.items.into_iter().next()?;
        item.snippet
            .and_then(|s| s.channel_id)
            .or(item.id.channel_id)
    }

    fn first_video_id(self) -> Option<String> {
        self.items.into_iter().next()?.id.video_id
    }
}

/// YouTube Data API v3 `search` client
pub struct YouTubeDataApi {
    client: reqwest::Client,
}

impl YouTubeDataApi {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn search(&self, params: &[(&str, &str)], api_key: &str) -> Result<SearchResponse> {
        let url = format!("{}/search", YOUTUBE_API_BASE);
        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("part", "snippet"), ("maxResults", "1"), ("key", api_key)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(match status.as_u16() {
                400 | 403 => ChatError::Auth(format!("YouTube API key rejected: {}", error_text)),
                _ => ChatError::Http(format!("HTTP {}: {}", status, error_text)),
            });
        }

        Ok(response.json::<SearchResponse>().await?)
    }
}

impl Default for YouTubeDataApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LiveVideoSearch for YouTubeDataApi {
    async fn find_channel_id(&self, name: &str, api_key: &str) -> Result<Option<String>> {
        let response = self
            .search(&[("q", name), ("type", "channel")], api_key)
            .await?;
        Ok(response.first_channel_id())
    }

    async fn find_live_video(&self, channel_id: &str, api_key: &str) -> Result<Option<String>> {
        let response = self
            .search(
                &[("channelId", channel_id), ("eventType", "live"), ("type", "video")],
                api_key,
            )
            .await?;
        Ok(response.first_video_id())
    }
}

/// Channel name or id → live video id. `api_key` is filled in from
/// `provider` when empty and kept for later lookups.
pub async fn resolve_live_video(
    channel: &str,
    api_key: &mut Option<String>,
    provider: &dyn ApiKeyProvider,
    search: &dyn LiveVideoSearch,
) -> Result<String> {
    let key = match api_key.clone().filter(|k| !k.trim().is_empty()) {
        Some(key) => key,
        None => {
            let key = provider
                .request_api_key()
                .await
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .ok_or(ChatError::NoApiKey)?;
            *api_key = Some(key.clone());
            key
        }
    };

    let channel_id = if is_channel_id(channel) {
        channel.to_string()
    } else {
        search
            .find_channel_id(channel, &key)
            .await?
            .ok_or_else(|| ChatError::Resolution(format!("No YouTube channel named '{}'", channel)))?
    };
    log::debug!("YouTube channel {} resolved to {}", channel, channel_id);

    search
        .find_live_video(&channel_id, &key)
        .await?
        .ok_or_else(|| {
            ChatError::Resolution("No live stream found. Please try a video ID or URL.".to_string())
        })
}
