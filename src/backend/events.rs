use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::assets::AssetKey;
use super::state::ConnectionState;

/// Chat platform an event originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Twitch,
    YouTube,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Twitch => write!(f, "Twitch"),
            Platform::YouTube => write!(f, "YouTube"),
        }
    }
}

/// Roles that earn a badge display priority, highest first.
///
/// The first role found (in this order, not in badge order) also picks the
/// highlight category of the username.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeRole {
    Broadcaster,
    Moderator,
    Vip,
    Subscriber,
    Anniversary,
}

impl BadgeRole {
    pub const PRIORITY: [BadgeRole; 5] = [
        BadgeRole::Broadcaster,
        BadgeRole::Moderator,
        BadgeRole::Vip,
        BadgeRole::Subscriber,
        BadgeRole::Anniversary,
    ];

    /// Map a badge set name onto its role, if it has one
    pub fn from_badge_name(name: &str) -> Option<Self> {
        match name {
            "broadcaster" => Some(BadgeRole::Broadcaster),
            "moderator" => Some(BadgeRole::Moderator),
            "vip" => Some(BadgeRole::Vip),
            "subscriber" => Some(BadgeRole::Subscriber),
            other if other.contains("anniversary") => Some(BadgeRole::Anniversary),
            _ => None,
        }
    }
}

/// A badge attached to a chat event, with its image URL when resolvable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatBadge {
    pub name: String,
    pub version: String,
    pub url: Option<String>,
}

impl ChatBadge {
    pub fn role(&self) -> Option<BadgeRole> {
        BadgeRole::from_badge_name(&self.name)
    }
}

/// One piece of a rendered message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Text { text: String },
    Emote { id: String, name: String, url: String },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text { text: text.into() }
    }
}

/// Unified chat message produced by either platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    pub platform: Platform,
    pub timestamp: DateTime<Local>,
    pub username: String,
    /// Always `#`-prefixed when present
    pub color: Option<String>,
    /// Raw message text, before emote substitution
    pub text: String,
    pub segments: Vec<Segment>,
    /// Sorted by display priority; badges without a role keep received order
    pub badges: Vec<ChatBadge>,
    /// Highlight category of the username
    pub role: Option<BadgeRole>,
    pub is_donation: bool,
    pub is_highlight: bool,
    pub bits: u32,
}

impl ChatEvent {
    /// Plain-text event with no badges, emotes or flags
    pub fn plain(platform: Platform, username: &str, text: &str) -> Self {
        Self {
            platform,
            timestamp: Local::now(),
            username: username.to_string(),
            color: None,
            text: text.to_string(),
            segments: vec![Segment::text(text)],
            badges: Vec::new(),
            role: None,
            is_donation: false,
            is_highlight: false,
            bits: 0,
        }
    }

    /// Only events with both a username and message text are ever dispatched
    pub fn is_displayable(&self) -> bool {
        !self.username.is_empty() && !self.text.is_empty()
    }

    /// Image assets referenced by this event, badges first
    pub fn asset_keys(&self) -> Vec<AssetKey> {
        let badges = self
            .badges
            .iter()
            .filter(|b| b.url.is_some())
            .map(|b| AssetKey::badge(&b.name, &b.version));
        let emotes = self.segments.iter().filter_map(|s| match s {
            Segment::Emote { id, .. } => Some(AssetKey::emote(id)),
            Segment::Text { .. } => None,
        });

        let mut keys: Vec<AssetKey> = Vec::new();
        for key in badges.chain(emotes) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

/// Everything the consumer can receive from the dispatcher
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A chat message
    Chat(ChatEvent),

    /// A system-level notification (connect, disconnect, failures)
    System { platform: Platform, message: String },

    /// A connection state transition
    State {
        platform: Platform,
        state: ConnectionState,
    },
}
