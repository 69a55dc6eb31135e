use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

use crate::backend::error::{ChatError, Result};

/// Decoded RGBA image shared between the cache and the consumer
pub type ImageHandle = Arc<image::RgbaImage>;

/// Downloads raw image bytes
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// `ImageFetcher` over plain HTTP GET
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ChatError::Asset(format!(
                "Image request to {} failed: HTTP {}",
                url,
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

type Slot = Arc<OnceCell<Option<ImageHandle>>>;

/// Process-lifetime image cache, one slot per asset key.
///
/// A slot is initialised at most once, including when the fetch fails, so a
/// broken asset is requested a single time and then rendered without its
/// image.
#[derive(Default)]
pub struct AssetCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached image for `key`, fetching `url` on first reference
    pub async fn get_or_fetch(
        &self,
        key: &str,
        url: &str,
        fetcher: &dyn ImageFetcher,
    ) -> Option<ImageHandle> {
        let slot = self.slot(key);

        slot.get_or_init(|| async {
            log::debug!("Fetching asset {} from {}", key, url);
            match fetcher.fetch(url).await.and_then(|bytes| decode(&bytes)) {
                Ok(image) => Some(image),
                Err(e) => {
                    log::warn!("Asset {} unavailable: {}", key, e);
                    None
                }
            }
        })
        .await
        .clone()
    }

    /// Peek at a finished entry without fetching
    pub fn get(&self, key: &str) -> Option<ImageHandle> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).and_then(|slot| slot.get().cloned().flatten())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.to_string()).or_default().clone()
    }
}

fn decode(bytes: &[u8]) -> Result<ImageHandle> {
    let image = image::load_from_memory(bytes)?;
    Ok(Arc::new(image.to_rgba8()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a 1x1 PNG and counts requests
    #[derive(Default)]
    pub(crate) struct CountingFetcher {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    #[async_trait]
    impl ImageFetcher for CountingFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ChatError::Asset("offline".to_string()));
            }
            let mut png = Vec::new();
            image::DynamicImage::ImageRgba8(image::RgbaImage::new(1, 1))
                .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
                .unwrap();
            Ok(png)
        }
    }

    #[tokio::test]
    async fn test_second_lookup_hits_cache() {
        let cache = AssetCache::new();
        let fetcher = CountingFetcher::default();

        let first = cache.get_or_fetch("25", "https://cdn/25", &fetcher).await;
        let second = cache.get_or_fetch("25", "https://cdn/25", &fetcher).await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
        assert!(cache.get("25").is_some());
    }

    #[tokio::test]
    async fn test_failed_fetch_not_retried() {
        let cache = AssetCache::new();
        let fetcher = CountingFetcher {
            fail: true,
            ..Default::default()
        };

        assert!(cache.get_or_fetch("x", "u", &fetcher).await.is_none());
        assert!(cache.get_or_fetch("x", "u", &fetcher).await.is_none());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(cache.get("x").is_none());
    }

    #[tokio::test]
    async fn test_undecodable_bytes_degrade() {
        struct Garbage;

        #[async_trait]
        impl ImageFetcher for Garbage {
            async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
                Ok(b"definitely not an image".to_vec())
            }
        }

        let cache = AssetCache::new();
        assert!(cache.is_empty());
        assert!(cache.get_or_fetch("g", "u", &Garbage).await.is_none());
        assert_eq!(cache.len(), 1);
    }
}
