//! Badge and emote asset resolution
//!
//! Badge URLs come from the global and per-channel badge display sets, emote
//! URLs from the emote CDN template. Images are fetched on first reference,
//! decoded once and kept for the lifetime of the process. Fetches never run on
//! a connection's receive loop: the loop hands keys to `prefetch`, which works
//! on its own task, and the consumer reads finished images with `cached_image`.

mod badges;
mod cache;

use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use super::error::{ChatError, Result};

pub use badges::{BadgeCatalog, BadgeDescriptor, BadgeScope};
pub use cache::{AssetCache, HttpImageFetcher, ImageFetcher, ImageHandle};

const EMOTE_CDN_URL: &str = "https://static-cdn.jtvnw.net/emoticons/v2";
const EMOTE_STYLE: &str = "default";
const EMOTE_THEME: &str = "dark";
const EMOTE_SCALE: &str = "1.0";

/// Identifies one image asset
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssetKey {
    Badge { name: String, version: String },
    Emote(String),
}

impl AssetKey {
    pub fn badge(name: &str, version: &str) -> Self {
        AssetKey::Badge {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    pub fn emote(id: &str) -> Self {
        AssetKey::Emote(id.to_string())
    }

    /// `name_version` for badges, the bare id for emotes
    pub fn cache_key(&self) -> String {
        match self {
            AssetKey::Badge { name, version } => format!("{}_{}", name, version),
            AssetKey::Emote(id) => id.clone(),
        }
    }
}

/// Twitch emote ids are alphanumeric with underscores (`25`, `emotesv2_1a2b`)
pub fn is_valid_emote_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub struct AssetResolver {
    client: reqwest::Client,
    fetcher: Arc<dyn ImageFetcher>,
    catalog: RwLock<BadgeCatalog>,
    global_loaded: OnceCell<()>,
    cache: AssetCache,
}

impl AssetResolver {
    pub fn new() -> Arc<Self> {
        let client = reqwest::Client::new();
        let fetcher = Arc::new(HttpImageFetcher::new(client.clone()));
        Arc::new(Self::with_fetcher(client, fetcher))
    }

    pub fn with_fetcher(client: reqwest::Client, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            client,
            fetcher,
            catalog: RwLock::new(BadgeCatalog::new()),
            global_loaded: OnceCell::new(),
            cache: AssetCache::new(),
        }
    }

    /// Load the global badge set. Only the first successful call hits the network.
    pub async fn load_global_badges(&self) -> Result<()> {
        self.global_loaded
            .get_or_try_init(|| async {
                let badges = badges::fetch_global_badges(&self.client).await?;
                log::info!("Loaded {} global badges", badges.len());
                self.set_global_badges(badges);
                Ok::<(), ChatError>(())
            })
            .await
            .map(|_| ())
    }

    /// Load the badge set of `channel_id`, unless it is already the loaded channel
    pub async fn load_channel_badges(&self, channel_id: &str) -> Result<()> {
        if self.read_catalog(|c| c.channel_id() == Some(channel_id)) {
            return Ok(());
        }

        let badges = badges::fetch_channel_badges(&self.client, channel_id).await?;
        log::info!("Loaded {} badges for channel {}", badges.len(), channel_id);
        self.set_channel_badges(channel_id, badges);
        Ok(())
    }

    pub fn set_global_badges(&self, badges: Vec<BadgeDescriptor>) {
        self.catalog
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_global(badges);
    }

    pub fn set_channel_badges(&self, channel_id: &str, badges: Vec<BadgeDescriptor>) {
        self.catalog
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_channel(channel_id, badges);
    }

    pub fn resolve_badge_url(&self, name: &str, version: &str) -> Option<String> {
        self.read_catalog(|c| c.resolve(name, version).map(str::to_string))
    }

    pub fn resolve_emote_url(&self, id: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            EMOTE_CDN_URL, id, EMOTE_STYLE, EMOTE_THEME, EMOTE_SCALE
        )
    }

    pub fn resolve_url(&self, key: &AssetKey) -> Option<String> {
        match key {
            AssetKey::Badge { name, version } => self.resolve_badge_url(name, version),
            AssetKey::Emote(id) if is_valid_emote_id(id) => Some(self.resolve_emote_url(id)),
            AssetKey::Emote(_) => None,
        }
    }

    /// Decoded image for `key`, downloading it on first reference
    pub async fn fetch_image(&self, key: &AssetKey) -> Option<ImageHandle> {
        let url = self.resolve_url(key)?;
        self.cache
            .get_or_fetch(&key.cache_key(), &url, self.fetcher.as_ref())
            .await
    }

    /// Already-downloaded image for `key`, without touching the network
    pub fn cached_image(&self, key: &AssetKey) -> Option<ImageHandle> {
        self.cache.get(&key.cache_key())
    }

    /// Warm the cache for `keys` on a background task
    pub fn prefetch(self: &Arc<Self>, keys: Vec<AssetKey>) -> Option<JoinHandle<()>> {
        let pending: Vec<AssetKey> = keys
            .into_iter()
            .filter(|key| self.cached_image(key).is_none())
            .collect();
        if pending.is_empty() {
            return None;
        }

        let resolver = Arc::clone(self);
        Some(tokio::spawn(async move {
            for key in pending {
                resolver.fetch_image(&key).await;
            }
        }))
    }

    fn read_catalog<T>(&self, f: impl FnOnce(&BadgeCatalog) -> T) -> T {
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        f(&catalog)
    }
}
