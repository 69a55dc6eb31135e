use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::Mutex;

use super::live_chat::{LiveChatHandle, LiveChatSource};
use super::resolve::{resolve_live_video, ApiKeyProvider, LiveVideoSearch, VideoInput};
use crate::backend::dispatch::EventDispatcher;
use crate::backend::error::{ChatError, Result};
use crate::backend::events::Platform;
use crate::backend::normalize::MessageNormalizer;
use crate::backend::session::{Lifecycle, LoopReporter, Session};
use crate::backend::state::ConnectionState;

/// YouTube live chat connection for one video at a time
pub struct YouTubeConnection {
    source: Arc<dyn LiveChatSource>,
    search: Arc<dyn LiveVideoSearch>,
    key_provider: Arc<dyn ApiKeyProvider>,
    normalizer: MessageNormalizer,
    lifecycle: Lifecycle,
    session: Mutex<Option<Session>>,
    api_key: StdMutex<Option<String>>,
    video_id: StdMutex<Option<String>>,
}

impl YouTubeConnection {
    pub fn new(
        source: Arc<dyn LiveChatSource>,
        search: Arc<dyn LiveVideoSearch>,
        key_provider: Arc<dyn ApiKeyProvider>,
        dispatcher: EventDispatcher,
        normalizer: MessageNormalizer,
    ) -> Self {
        Self {
            source,
            search,
            key_provider,
            normalizer,
            lifecycle: Lifecycle::new(Platform::YouTube, dispatcher),
            session: Mutex::new(None),
            api_key: StdMutex::new(None),
            video_id: StdMutex::new(None),
        }
    }

    /// Seed the Data API key, e.g. from saved settings
    pub fn with_api_key(self, api_key: Option<String>) -> Self {
        *self.api_key.lock().unwrap_or_else(PoisonError::into_inner) = api_key;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state.get()
    }

    /// Key used for the last lookup, including one obtained from the provider
    pub fn api_key(&self) -> Option<String> {
        self.api_key.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn video_id(&self) -> Option<String> {
        self.video_id.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Resolve `input` to a live video and start polling its chat.
    ///
    /// Resolution failures (including a missing API key) return before any
    /// state change.
    pub async fn connect(&self, input: &str) -> Result<()> {
        let video_id = self.resolve(input).await?;

        let mut session = self.session.lock().await;
        self.lifecycle.begin(&mut session).await;

        let handle = match self.source.create(&video_id).await {
            Ok(handle) => handle,
            Err(e) => {
                self.lifecycle.fail(&e);
                return Err(e);
            }
        };

        *self.video_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(video_id.clone());
        self.lifecycle
            .connected(format!("Connected to YouTube video {}", video_id));

        let normalizer = self.normalizer.clone();
        *session = Some(Session::spawn(|shutdown| {
            let reporter = LoopReporter::new(&self.lifecycle, shutdown);
            poll_loop(handle, reporter, normalizer)
        }));
        Ok(())
    }

    /// Stop polling. Does nothing when already disconnected.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        self.lifecycle.end(&mut session, "Disconnected from YouTube").await;
    }

    async fn resolve(&self, input: &str) -> Result<String> {
        let channel = match VideoInput::parse(input) {
            Some(VideoInput::Video(id)) => return Ok(id),
            Some(VideoInput::Channel(channel)) => channel,
            None => {
                return Err(ChatError::Config(
                    "Please enter a YouTube channel name, video ID, or URL".to_string(),
                ))
            }
        };

        self.lifecycle
            .dispatcher
            .try_system(Platform::YouTube, "Searching for live stream...");

        let mut api_key = self.api_key();
        let result = resolve_live_video(
            &channel,
            &mut api_key,
            self.key_provider.as_ref(),
            self.search.as_ref(),
        )
        .await;
        *self.api_key.lock().unwrap_or_else(PoisonError::into_inner) = api_key;
        result
    }
}

/// Fetch batches until the chat ends, a fetch fails, or the loop is stopped
async fn poll_loop(
    mut handle: Box<dyn LiveChatHandle>,
    reporter: LoopReporter,
    normalizer: MessageNormalizer,
) {
    let cause = 'session: loop {
        if !reporter.is_connected() {
            break None;
        }
        if !handle.is_alive() {
            break Some("YouTube live chat has ended".to_string());
        }

        let batch = tokio::select! {
            _ = reporter.stopped() => break None,
            batch = handle.fetch_batch() => batch,
        };

        let items = match batch {
            Ok(items) => items,
            Err(e) => break Some(format!("YouTube chat error: {}", e)),
        };
        for item in items {
            let event = normalizer.youtube(&item.author, &item.message);
            if !reporter.chat(event).await {
                break 'session None;
            }
        }
    };

    handle.terminate();
    reporter.finish(cause).await;
}
