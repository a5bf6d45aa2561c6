//! Test doubles for the background capabilities.

use crate::background::{BackgroundImage, DecodeError, FetchError, ImageDecoder, ImageFetcher};
use crate::storage::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;
use url::Url;

pub(crate) type Reply = Result<Vec<u8>, FetchError>;

/// Fetcher whose responses are released by the test.
#[derive(Default)]
pub(crate) struct GatedFetcher {
    gates: Mutex<HashMap<Url, oneshot::Receiver<Reply>>>,
}

impl GatedFetcher {
    /// Arm a response for `url`. The fetch waits until the sender is used;
    /// dropping the sender resolves it as cancelled.
    pub(crate) fn gate(&self, url: &Url) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(url.clone(), rx);
        tx
    }
}

impl ImageFetcher for GatedFetcher {
    fn fetch(&self, url: &Url) -> BoxFuture<'static, Reply> {
        let gate = self.gates.lock().remove(url);
        Box::pin(async move {
            match gate {
                Some(rx) => rx.await.unwrap_or(Err(FetchError::Cancelled)),
                None => Err(FetchError::Network("unreachable".to_string())),
            }
        })
    }
}

/// Accepts payloads prefixed with `img:`; width is the payload length.
pub(crate) struct StubDecoder;

impl ImageDecoder for StubDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<BackgroundImage, DecodeError> {
        match bytes.strip_prefix(b"img:") {
            Some(rest) if !rest.is_empty() => Ok(BackgroundImage {
                width: rest.len() as u32,
                height: 1,
                rgba: rest.to_vec(),
            }),
            _ => Err(DecodeError("not an image".to_string())),
        }
    }
}

/// Let spawned tasks run to their next await point.
pub(crate) async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
