use serde::Deserialize;
use std::collections::HashMap;

use crate::backend::error::{ChatError, Result};

const GLOBAL_BADGES_URL: &str = "https://badges.twitch.tv/v1/badges/global/display";
const CHANNEL_BADGES_URL: &str = "https://badges.twitch.tv/v1/badges/channels";

/// Where a badge definition comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BadgeScope {
    Channel,
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeDescriptor {
    pub name: String,
    pub version: String,
    pub scope: BadgeScope,
    pub image_url: String,
}

/// Badge display endpoint response:
/// `{"badge_sets": {"<name>": {"versions": {"<version>": {"image_url_1x": ...}}}}}`
#[derive(Debug, Deserialize)]
struct BadgeSetsResponse {
    #[serde(default)]
    badge_sets: HashMap<String, BadgeSet>,
}

#[derive(Debug, Deserialize)]
struct BadgeSet {
    #[serde(default)]
    versions: HashMap<String, BadgeVersion>,
}

#[derive(Debug, Deserialize)]
struct BadgeVersion {
    image_url_1x: String,
}

/// Global and channel badge sets; channel entries shadow global ones
#[derive(Debug, Default)]
pub struct BadgeCatalog {
    global: HashMap<(String, String), String>,
    channel: HashMap<(String, String), String>,
    channel_id: Option<String>,
}

impl BadgeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the global set
    pub fn set_global(&mut self, badges: Vec<BadgeDescriptor>) {
        self.global = Self::index(badges);
    }

    /// Replace the channel set, remembering which channel it belongs to
    pub fn set_channel(&mut self, channel_id: &str, badges: Vec<BadgeDescriptor>) {
        self.channel = Self::index(badges);
        self.channel_id = Some(channel_id.to_string());
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.channel_id.as_deref()
    }

    pub fn resolve(&self, name: &str, version: &str) -> Option<&str> {
        let key = (name.to_string(), version.to_string());
        self.channel
            .get(&key)
            .or_else(|| self.global.get(&key))
            .map(String::as_str)
    }

    fn index(badges: Vec<BadgeDescriptor>) -> HashMap<(String, String), String> {
        badges
            .into_iter()
            .map(|b| ((b.name, b.version), b.image_url))
            .collect()
    }
}

/// Parse a badge display endpoint body into descriptors of the given scope
pub fn parse_badge_sets(body: &str, scope: BadgeScope) -> Result<Vec<BadgeDescriptor>> {
    let response: BadgeSetsResponse = serde_json::from_str(body)?;

    let mut badges = Vec::new();
    for (name, set) in response.badge_sets {
        for (version, info) in set.versions {
            badges.push(BadgeDescriptor {
                name: name.clone(),
                version,
                scope,
                image_url: info.image_url_1x,
            });
        }
    }
    Ok(badges)
}

/// Fetch the global badge set
pub async fn fetch_global_badges(client: &reqwest::Client) -> Result<Vec<BadgeDescriptor>> {
    fetch_badges(client, GLOBAL_BADGES_URL, BadgeScope::Global).await
}

/// Fetch the badge set of one channel
pub async fn fetch_channel_badges(
    client: &reqwest::Client,
    channel_id: &str,
) -> Result<Vec<BadgeDescriptor>> {
    let url = format!(
        "{}/{}/display",
        CHANNEL_BADGES_URL,
        urlencoding::encode(channel_id)
    );
    fetch_badges(client, &url, BadgeScope::Channel).await
}

async fn fetch_badges(
    client: &reqwest::Client,
    url: &str,
    scope: BadgeScope,
) -> Result<Vec<BadgeDescriptor>> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(ChatError::Asset(format!(
            "Badge request to {} failed: HTTP {}",
            url,
            response.status()
        )));
    }

    let body = response.text().await?;
    parse_badge_sets(&body, scope)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, version: &str, scope: BadgeScope, url: &str) -> BadgeDescriptor {
        BadgeDescriptor {
            name: name.to_string(),
            version: version.to_string(),
            scope,
            image_url: url.to_string(),
        }
    }

    #[test]
    fn test_channel_shadows_global() {
        let mut catalog = BadgeCatalog::new();
        catalog.set_global(vec![
            descriptor("subscriber", "0", BadgeScope::Global, "global-sub"),
            descriptor("vip", "1", BadgeScope::Global, "global-vip"),
        ]);
        catalog.set_channel(
            "1234",
            vec![descriptor("subscriber", "0", BadgeScope::Channel, "channel-sub")],
        );

        assert_eq!(catalog.resolve("subscriber", "0"), Some("channel-sub"));
        assert_eq!(catalog.resolve("vip", "1"), Some("global-vip"));
        assert_eq!(catalog.resolve("vip", "2"), None);
        assert_eq!(catalog.channel_id(), Some("1234"));
    }

    #[test]
    fn test_parse_display_response() {
        let body = r#"{
            "badge_sets": {
                "moderator": {"versions": {"1": {"image_url_1x": "https://cdn/mod1", "title": "Moderator"}}},
                "subscriber": {"versions": {
                    "0": {"image_url_1x": "https://cdn/sub0"},
                    "3": {"image_url_1x": "https://cdn/sub3"}
                }}
            }
        }"#;

        let mut badges = parse_badge_sets(body, BadgeScope::Global).unwrap();
        badges.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));

        assert_eq!(badges.len(), 3);
        assert_eq!(badges[0], descriptor("moderator", "1", BadgeScope::Global, "https://cdn/mod1"));
        assert_eq!(badges[2].image_url, "https://cdn/sub3");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_badge_sets("not json", BadgeScope::Channel).is_err());
        assert!(parse_badge_sets("{}", BadgeScope::Channel).unwrap().is_empty());
    }
}
