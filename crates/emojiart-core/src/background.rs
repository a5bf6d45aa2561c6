//! Background image resolution.
//!
//! Turns a [`BackgroundRef`] into a decoded image. Inline bytes are decoded
//! on the spot; remote URLs are fetched on the runtime and decoded on the
//! blocking pool. At most one fetch is live at a time: resolving a new
//! background aborts the previous task and bumps a generation counter, so a
//! completion that slips through anyway is recognised as stale and dropped
//! without touching shared state.

use crate::document::BackgroundRef;
use crate::events::{DocumentChange, DocumentObserver};
use crate::storage::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

/// Observable state of background resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FetchStatus {
    /// Nothing in flight; the resolved image (if any) is current.
    #[default]
    Idle,
    /// A remote fetch is in flight.
    Fetching,
    /// Resolution failed. Carries the URL for remote backgrounds and `None`
    /// when inline bytes could not be decoded.
    Failed(Option<Url>),
}

impl FetchStatus {
    pub fn is_fetching(&self) -> bool {
        matches!(self, FetchStatus::Fetching)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FetchStatus::Failed(_))
    }
}

/// Image bytes could not be decoded.
#[derive(Debug, Clone, Error)]
#[error("Could not decode image: {0}")]
pub struct DecodeError(pub String);

/// A remote fetch did not produce bytes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("Fetch cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        FetchError::Network(error.to_string())
    }
}

/// A decoded background image as straight RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl BackgroundImage {
    /// Pixel size as `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Turns encoded image bytes into pixels.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<BackgroundImage, DecodeError>;
}

/// Retrieves the bytes behind a URL.
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> BoxFuture<'static, Result<Vec<u8>, FetchError>>;
}

/// Decoder backed by the `image` crate (PNG, JPEG, WebP, GIF).
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterDecoder;

impl ImageDecoder for RasterDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<BackgroundImage, DecodeError> {
        let image = image::load_from_memory(bytes).map_err(|e| DecodeError(e.to_string()))?;
        let rgba = image.to_rgba8();
        if rgba.width() == 0 || rgba.height() == 0 {
            return Err(DecodeError("image has no pixels".to_string()));
        }
        Ok(BackgroundImage {
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
        })
    }
}

/// HTTP(S) fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("emojiart/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl ImageFetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> BoxFuture<'static, Result<Vec<u8>, FetchError>> {
        let client = self.client.clone();
        let url = url.clone();
        Box::pin(async move {
            let response = client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            Ok(response.bytes().await?.to_vec())
        })
    }
}

struct ResolverState {
    /// Bumped on every resolve; a fetch may only publish under its own generation.
    generation: u64,
    background: BackgroundRef,
    image: Option<Arc<BackgroundImage>>,
    in_flight: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<ResolverState>,
    status: watch::Sender<FetchStatus>,
}

impl Shared {
    fn set_status(&self, status: FetchStatus) {
        log::debug!("Background status -> {:?}", status);
        self.status.send_replace(status);
    }
}

/// Resolves the session's background into a decoded image.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct BackgroundResolver {
    shared: Arc<Shared>,
    fetcher: Arc<dyn ImageFetcher>,
    decoder: Arc<dyn ImageDecoder>,
    runtime: Handle,
}

impl BackgroundResolver {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        decoder: Arc<dyn ImageDecoder>,
        runtime: Handle,
    ) -> Self {
        let (status, _) = watch::channel(FetchStatus::Idle);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ResolverState {
                    generation: 0,
                    background: BackgroundRef::Blank,
                    image: None,
                    in_flight: None,
                }),
                status,
            }),
            fetcher,
            decoder,
            runtime,
        }
    }

    /// Start resolving `background`, superseding whatever was in progress.
    pub fn resolve(&self, background: &BackgroundRef) {
        let mut state = self.shared.state.lock();
        state.generation += 1;
        let generation = state.generation;
        state.background = background.clone();
        state.image = None;
        if let Some(previous) = state.in_flight.take() {
            previous.abort();
        }

        match background {
            BackgroundRef::Blank => self.shared.set_status(FetchStatus::Idle),
            BackgroundRef::ImageData(bytes) => match self.decoder.decode(bytes) {
                Ok(image) => {
                    state.image = Some(Arc::new(image));
                    self.shared.set_status(FetchStatus::Idle);
                }
                Err(e) => {
                    log::warn!("Inline background rejected: {}", e);
                    self.shared.set_status(FetchStatus::Failed(None));
                }
            },
            BackgroundRef::Url(url) => {
                self.shared.set_status(FetchStatus::Fetching);
                log::debug!("Fetching background {} (generation {})", url, generation);

                let fetch = self.fetcher.fetch(url);
                let shared = Arc::clone(&self.shared);
                let decoder = Arc::clone(&self.decoder);
                let url = url.clone();
                state.in_flight = Some(self.runtime.spawn(async move {
                    let outcome = match fetch.await {
                        Ok(bytes) => Ok(decode_off_runtime(decoder, bytes).await),
                        Err(e) => Err(e),
                    };
                    finish_fetch(&shared, generation, &url, outcome);
                }));
            }
        }
    }

    pub fn status(&self) -> FetchStatus {
        self.shared.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<FetchStatus> {
        self.shared.status.subscribe()
    }

    /// The most recently resolved image for the current background.
    pub fn resolved_image(&self) -> Option<Arc<BackgroundImage>> {
        self.shared.state.lock().image.clone()
    }

    /// The background the resolver is currently working on.
    pub fn background(&self) -> BackgroundRef {
        self.shared.state.lock().background.clone()
    }

    /// Acknowledge a failure notice, returning the status to idle.
    pub fn dismiss_failure(&self) {
        let _state = self.shared.state.lock();
        if self.shared.status.borrow().is_failed() {
            self.shared.set_status(FetchStatus::Idle);
        }
    }
}

impl DocumentObserver for BackgroundResolver {
    fn document_replaced(&self, change: &DocumentChange<'_>) {
        if change.background_changed {
            self.resolve(change.document.background());
        }
    }
}

/// Decode on the blocking pool so large images never stall a runtime worker.
async fn decode_off_runtime(
    decoder: Arc<dyn ImageDecoder>,
    bytes: Vec<u8>,
) -> Result<BackgroundImage, DecodeError> {
    tokio::task::spawn_blocking(move || decoder.decode(&bytes))
        .await
        .unwrap_or_else(|e| Err(DecodeError(format!("decoder task failed: {}", e))))
}

/// Apply the outcome of fetch `generation`, unless it has been superseded.
fn finish_fetch(
    shared: &Shared,
    generation: u64,
    url: &Url,
    outcome: Result<Result<BackgroundImage, DecodeError>, FetchError>,
) {
    let mut state = shared.state.lock();
    if state.generation != generation || state.background.url() != Some(url) {
        log::debug!("Discarding stale fetch of {}", url);
        return;
    }

    match outcome {
        Ok(Ok(image)) => {
            state.in_flight = None;
            state.image = Some(Arc::new(image));
            shared.set_status(FetchStatus::Idle);
        }
        Ok(Err(e)) => {
            state.in_flight = None;
            log::warn!("Background {} is not a usable image: {}", url, e);
            shared.set_status(FetchStatus::Failed(Some(url.clone())));
        }
        // A newer fetch owns status reporting.
        Err(FetchError::Cancelled) => log::debug!("Fetch of {} cancelled", url),
        Err(e) => {
            state.in_flight = None;
            log::warn!("Fetching background {} failed: {}", url, e);
            shared.set_status(FetchStatus::Failed(Some(url.clone())));
        }
    }
}
