//! Binding of one visible image slot to the resource cache.
//!
//! A slot owns at most one live request. Changing the source cancels the
//! previous request's token; results of a cancelled request are discarded
//! while the underlying cache fetch keeps running and still populates the cache.

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::domain::entities::{
    CachedImage, ImageMetadata, ImageOptions, PlaceholderKind, ResolvedImage,
};
use crate::domain::ports::CacheError;
use crate::infrastructure::image::{ImageCacheManager, fallback_placeholder};

/// Observable state of an image slot.
#[derive(Debug, Clone, Default)]
pub struct SlotState {
    /// Reference to render: the optimized locator, or the original source on failure.
    pub src: Option<String>,
    /// Resolved payload on success.
    pub image: Option<CachedImage>,
    /// Placeholder data URI shown while loading.
    pub placeholder: Option<String>,
    /// Decoded metadata of the original source, when available.
    pub metadata: Option<ImageMetadata>,
    /// True while a request is in flight.
    pub loading: bool,
    /// Error of the last request, for "image not found" affordances.
    pub error: Option<CacheError>,
}

impl SlotState {
    fn loading(src: String, placeholder: Option<String>) -> Self {
        Self {
            src: Some(src),
            placeholder,
            loading: true,
            ..Self::default()
        }
    }
}

/// One image slot bound to the cache.
pub struct ImageSlot {
    cache: ImageCacheManager,
    state_tx: watch::Sender<SlotState>,
    current: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for ImageSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSlot")
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl ImageSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new(cache: ImageCacheManager) -> Self {
        let (state_tx, _) = watch::channel(SlotState::default());
        Self {
            cache,
            state_tx,
            current: Mutex::new(None),
        }
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SlotState> {
        self.state_tx.subscribe()
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> SlotState {
        self.state_tx.borrow().clone()
    }

    /// Binds the slot to `src`, cancelling any previous request.
    ///
    /// Publishes a loading state immediately, then the refined placeholder, then
    /// the result. The returned handle completes when the request settles or is
    /// discarded.
    pub fn set_source(&self, src: impl Into<String>, options: ImageOptions) -> JoinHandle<()> {
        let src = src.into();
        let token = CancellationToken::new();
        if let Some(previous) = self.current.lock().replace(token.clone()) {
            previous.cancel();
        }

        if options.preload {
            drop(self.cache.optimizer().preload_image(&src, &options));
        }

        let placeholder =
            (options.placeholder != PlaceholderKind::None).then(fallback_placeholder);
        self.state_tx
            .send_replace(SlotState::loading(src.clone(), placeholder));

        let cache = self.cache.clone();
        let state_tx = self.state_tx.clone();
        tokio::spawn(load(cache, state_tx, token, src, options))
    }

    /// Detaches the slot; any in-flight result is discarded.
    pub fn unmount(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
            debug!("Image slot unmounted");
        }
    }

    /// Forwards to the cache's batch preload.
    pub async fn preload_next(&self, urls: &[String], options: &ImageOptions) -> Vec<ResolvedImage> {
        self.cache.preload(urls, options).await
    }
}

impl Drop for ImageSlot {
    fn drop(&mut self) {
        self.unmount();
    }
}

async fn load(
    cache: ImageCacheManager,
    state_tx: watch::Sender<SlotState>,
    token: CancellationToken,
    src: String,
    options: ImageOptions,
) {
    if options.placeholder != PlaceholderKind::None {
        let optimizer = cache.optimizer();
        let metadata = optimizer.image_metadata(&src).await.ok();
        if token.is_cancelled() {
            trace!(src = %src, "Discarding stale metadata");
            return;
        }

        let placeholder = optimizer.generate_placeholder(metadata.as_ref(), options.placeholder);
        publish(&state_tx, &token, |state| {
            state.metadata = metadata;
            state.placeholder = placeholder;
        });
    }

    let result = cache.try_get(&src, &options).await;
    let applied = publish(&state_tx, &token, |state| {
        state.loading = false;
        match result {
            Ok(image) => {
                state.src = Some(image.locator.to_string());
                state.image = Some(image);
                state.error = None;
            }
            Err(e) => {
                state.src = Some(src.clone());
                state.image = None;
                state.error = Some(e);
            }
        }
    });

    if !applied {
        trace!(src = %src, "Discarding stale image result");
    }
}

/// Applies `update` unless the request was cancelled. The token is checked under
/// the channel lock so a newer request's state is never overwritten.
fn publish(
    state_tx: &watch::Sender<SlotState>,
    token: &CancellationToken,
    update: impl FnOnce(&mut SlotState),
) -> bool {
    state_tx.send_if_modified(|state| {
        if token.is_cancelled() {
            return false;
        }
        update(state);
        true
    })
}
