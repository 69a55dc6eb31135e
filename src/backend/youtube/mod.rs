//! YouTube live chat integration
//!
//! User input is resolved to a live video id, either directly from a URL or
//! id, or through the Data API for channel names. Chat is then polled through
//! a `LiveChatSource`; the shipped one reads the public web live-chat feed.

mod connection;
mod live_chat;
mod resolve;

pub use connection::YouTubeConnection;
pub use live_chat::{ChatItem, InnertubeLiveChat, LiveChatHandle, LiveChatSource};
pub use resolve::{
    is_channel_id, resolve_live_video, ApiKeyProvider, LiveVideoSearch, VideoInput, YouTubeDataApi,
};
