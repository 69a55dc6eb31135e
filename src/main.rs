use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;

use backend::assets::AssetResolver;
use backend::config::{self, AppConfig};
use backend::dispatch::{EventDispatcher, FeedReceiver};
use backend::events::{FeedEvent, Platform};
use backend::normalize::MessageNormalizer;
use backend::twitch::TwitchConnection;
use backend::youtube::{ApiKeyProvider, InnertubeLiveChat, YouTubeConnection, YouTubeDataApi};
use display::DisplayBuffer;
use log::{error, info, warn};

pub mod backend;
mod display;

const API_KEY_ENV: &str = "YOUTUBE_API_KEY";

/// Reads the Data API key from the environment; the console has no prompt
struct EnvKeyProvider;

#[async_trait]
impl ApiKeyProvider for EnvKeyProvider {
    async fn request_api_key(&self) -> Option<String> {
        let key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty());
        if key.is_none() {
            warn!(
                "Finding a live stream by channel needs a YouTube Data API v3 key. \
                 Create one at console.cloud.google.com and set {} or `youtube_api_key`, \
                 or connect with a video ID or URL instead.",
                API_KEY_ENV
            );
        }
        key
    }
}

async fn print_feed(feed: FeedReceiver) {
    let mut events = feed.into_stream();
    let mut buffer = DisplayBuffer::new();

    while let Some(event) = events.next().await {
        let is_state = matches!(event, FeedEvent::State { .. });
        match buffer.push(event) {
            Some(line) => println!("{}", line),
            None if is_state => info!("{}", buffer.status_line()),
            None => {}
        }
    }
}

async fn connect_configured(
    config: &AppConfig,
    twitch: &TwitchConnection,
    youtube: &YouTubeConnection,
    dispatcher: &EventDispatcher,
) {
    let mut any = false;

    if !config.twitch_channel.trim().is_empty() {
        any = true;
        match twitch.connect(&config.twitch_channel, &config.twitch_token).await {
            Ok(()) => match twitch.channel_id() {
                Some(id) => info!("Twitch channel id {}", id),
                None => info!("Twitch channel id unknown, channel badges disabled"),
            },
            Err(e) => {
                dispatcher
                    .try_system(Platform::Twitch, format!("Twitch connection error: {}", e));
            }
        }
    }

    if !config.youtube_input.trim().is_empty() {
        any = true;
        if let Err(e) = youtube.connect(&config.youtube_input).await {
            dispatcher.try_system(Platform::YouTube, format!("YouTube connection error: {}", e));
        }
    }

    if !any {
        warn!(
            "Nothing to connect to. Set twitch_channel and youtube_input in {}",
            config::config_path().display()
        );
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut app_config = match config::load_config() {
        Ok(app_config) => app_config,
        Err(e) => {
            error!("{}", e);
            AppConfig::default()
        }
    };

    let (dispatcher, feed) = EventDispatcher::new();
    let printer = tokio::spawn(print_feed(feed));

    let assets = AssetResolver::new();
    if let Err(e) = assets.load_global_badges().await {
        warn!("Global badges unavailable: {}", e);
    }
    let normalizer = MessageNormalizer::new(assets);

    let twitch = TwitchConnection::new(
        app_config.twitch_client_id.clone(),
        dispatcher.clone(),
        normalizer.clone(),
    );
    let youtube = YouTubeConnection::new(
        Arc::new(InnertubeLiveChat::new()),
        Arc::new(YouTubeDataApi::new()),
        Arc::new(EnvKeyProvider),
        dispatcher.clone(),
        normalizer,
    )
    .with_api_key(app_config.youtube_api_key.clone());

    connect_configured(&app_config, &twitch, &youtube, &dispatcher).await;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Shutting down");

    twitch.disconnect().await;
    youtube.disconnect().await;

    if let Some(key) = youtube.api_key() {
        app_config.youtube_api_key = Some(key);
    }
    if let Err(e) = config::save_config(&app_config) {
        error!("{}", e);
    }

    // Every sender is gone once the connections are, which ends the printer
    drop(twitch);
    drop(youtube);
    drop(dispatcher);
    if let Err(e) = printer.await {
        error!("Feed printer panicked: {}", e);
    }
}
