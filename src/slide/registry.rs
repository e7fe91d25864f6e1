//! Slide registry: caches opened pyramids.
//!
//! The registry provides:
//! - LRU caching of opened readers, so a slide is decoded once while hot
//! - Singleflight, so concurrent requests for a cold slide share one open
//!
//! Failed opens are handed to every waiter and are not cached.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::debug;

use crate::error::ReaderError;

use super::reader::{PyramidOpener, PyramidReader};

// =============================================================================
// Configuration
// =============================================================================

/// Default capacity for the slide cache (number of slides).
pub const DEFAULT_SLIDE_CACHE_CAPACITY: usize = 16;

type OpenResult = Result<Arc<dyn PyramidReader>, ReaderError>;

// =============================================================================
// SlideRegistry
// =============================================================================

/// Cache of open pyramid readers keyed by filesystem path.
pub struct SlideRegistry<O: PyramidOpener> {
    /// Backend that decodes slides
    opener: O,

    /// Open readers indexed by path
    cache: RwLock<LruCache<String, Arc<dyn PyramidReader>>>,

    /// In-flight opens for singleflight
    in_flight: Mutex<HashMap<String, Arc<InFlightState>>>,
}

/// State for an in-flight open.
struct InFlightState {
    /// Notification for waiters
    notify: Notify,
    /// Result of the open (set when complete)
    result: Mutex<Option<OpenResult>>,
}

impl<O: PyramidOpener> SlideRegistry<O> {
    pub fn new(opener: O) -> Self {
        Self::with_capacity(opener, DEFAULT_SLIDE_CACHE_CAPACITY)
    }

    /// Create a registry holding at most `capacity` open slides (minimum 1).
    pub fn with_capacity(opener: O, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            opener,
            cache: RwLock::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Get the reader for `path`, opening it if not already cached.
    pub async fn get(&self, path: &Path) -> OpenResult {
        let key = path.display().to_string();

        // Fast path: check cache
        {
            let mut cache = self.cache.write().await;
            if let Some(reader) = cache.get(&key) {
                return Ok(reader.clone());
            }
        }

        // Slow path: wait on an in-flight open or become its leader
        let state = {
            let mut in_flight = self.in_flight.lock().await;

            if let Some(state) = in_flight.get(&key) {
                state.clone()
            } else {
                let state = Arc::new(InFlightState {
                    notify: Notify::new(),
                    result: Mutex::new(None),
                });
                in_flight.insert(key.clone(), state.clone());
                drop(in_flight);

                debug!(path = %key, "Opening slide");
                let result = self.opener.open(path).await;

                *state.result.lock().await = Some(result.clone());

                if let Ok(ref reader) = result {
                    self.cache.write().await.put(key.clone(), reader.clone());
                }

                self.in_flight.lock().await.remove(&key);
                state.notify.notify_waiters();

                return result;
            }
        };

        loop {
            let notified = state.notify.notified();
            if let Some(result) = state.result.lock().await.as_ref() {
                return result.clone();
            }
            notified.await;
        }
    }

    /// Drop `path` from the cache, forcing the next request to reopen it.
    pub async fn invalidate(&self, path: &Path) {
        self.cache.write().await.pop(&path.display().to_string());
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    /// Number of open slides held.
    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use image::RgbImage;
    use tokio::time::{sleep, Duration};

    struct Blank;

    impl PyramidReader for Blank {
        fn level_count(&self) -> usize {
            1
        }

        fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
            (level == 0).then_some((512, 512))
        }

        fn level_downsample(&self, level: usize) -> Option<f64> {
            (level == 0).then_some(1.0)
        }

        fn read_region(
            &self,
            _location: (i64, i64),
            _level: usize,
            size: (u32, u32),
        ) -> Result<RgbImage, ReaderError> {
            Ok(RgbImage::new(size.0, size.1))
        }
    }

    /// Counts opens; paths containing "bad" fail.
    #[derive(Default)]
    struct CountingOpener {
        opens: AtomicUsize,
        delay: Option<Duration>,
    }

    impl CountingOpener {
        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PyramidOpener for CountingOpener {
        async fn open(&self, path: &Path) -> OpenResult {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                sleep(delay).await;
            }
            if path.to_string_lossy().contains("bad") {
                return Err(ReaderError::Decode {
                    message: "corrupt".into(),
                });
            }
            Ok(Arc::new(Blank))
        }
    }

    fn p(name: &str) -> PathBuf {
        PathBuf::from("/slides").join(name)
    }

    #[tokio::test]
    async fn test_registry_caches_slides() {
        let registry = SlideRegistry::with_capacity(CountingOpener::default(), 10);

        registry.get(&p("a.tiff")).await.unwrap();
        registry.get(&p("a.tiff")).await.unwrap();
        assert_eq!(registry.opener.opens(), 1);

        registry.get(&p("b.tiff")).await.unwrap();
        assert_eq!(registry.opener.opens(), 2);
    }

    #[tokio::test]
    async fn test_registry_cache_eviction() {
        let registry = SlideRegistry::with_capacity(CountingOpener::default(), 2);

        registry.get(&p("1.tiff")).await.unwrap();
        registry.get(&p("2.tiff")).await.unwrap();
        registry.get(&p("3.tiff")).await.unwrap();
        assert_eq!(registry.cached_count().await, 2);

        // Least recently used was evicted
        registry.get(&p("1.tiff")).await.unwrap();
        assert_eq!(registry.opener.opens(), 4);
    }

    #[tokio::test]
    async fn test_registry_invalidate_and_clear() {
        let registry = SlideRegistry::new(CountingOpener::default());

        registry.get(&p("a.tiff")).await.unwrap();
        registry.invalidate(&p("a.tiff")).await;
        assert_eq!(registry.cached_count().await, 0);

        registry.get(&p("a.tiff")).await.unwrap();
        registry.get(&p("b.tiff")).await.unwrap();
        assert_eq!(registry.opener.opens(), 2 + 1);

        registry.clear().await;
        assert_eq!(registry.cached_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_open_is_not_cached() {
        let registry = SlideRegistry::new(CountingOpener::default());

        assert!(registry.get(&p("bad.tiff")).await.is_err());
        assert!(registry.get(&p("bad.tiff")).await.is_err());
        assert_eq!(registry.opener.opens(), 2);
        assert_eq!(registry.cached_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_opens_singleflight() {
        let opener = CountingOpener {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let registry = Arc::new(SlideRegistry::new(opener));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.get(&p("a.tiff")).await.map(|r| r.level_count())
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 1);
        }
        assert_eq!(registry.opener.opens(), 1);
    }
}
