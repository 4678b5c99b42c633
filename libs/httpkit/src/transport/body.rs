//! Request body with upload progress and speed limiting.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll, ready};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body::{Frame, SizeHint};
use pin_project_lite::pin_project;
use tokio::time::Sleep;

use crate::progress::{Cancelled, Progress};

const MAX_CHUNK: usize = 16 * 1024;

/// Byte counters of one exchange, shared between the body and the engine.
#[derive(Debug, Default)]
pub(super) struct TransferCounters {
    pub(super) uploaded: AtomicU64,
    pub(super) downloaded: AtomicU64,
    /// Set once the whole request body has been handed to the connection.
    pub(super) upload_done: AtomicBool,
}

impl TransferCounters {
    pub(super) fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::SeqCst)
    }

    pub(super) fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::SeqCst)
    }

    pub(super) fn upload_done(&self) -> bool {
        self.upload_done.load(Ordering::SeqCst)
    }
}

pub(super) fn as_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// How long to pause so that `bytes` moved in `elapsed` stays at or below
/// `max_speed` bytes per second. `None` when no pause is needed.
pub(super) fn throttle_delay(bytes: u64, max_speed: u64, elapsed: Duration) -> Option<Duration> {
    let expected_ms = (u128::from(bytes) * 1000).checked_div(u128::from(max_speed))?;
    let expected = Duration::from_millis(u64::try_from(expected_ms).unwrap_or(u64::MAX));
    expected.checked_sub(elapsed).filter(|wait| !wait.is_zero())
}

pin_project! {
    /// Fully buffered request body streamed in chunks.
    ///
    /// Every chunk reports to [`Progress`]; a stop request fails the body
    /// with [`Cancelled`], which aborts the exchange.
    pub(super) struct UploadBody {
        data: Bytes,
        sent: usize,
        chunk: usize,
        max_speed: u64,
        started: Option<Instant>,
        progress: Arc<Progress>,
        counters: Arc<TransferCounters>,
        #[pin]
        delay: Option<Sleep>,
    }
}

impl UploadBody {
    pub(super) fn new(
        data: Bytes,
        max_speed: u64,
        progress: Arc<Progress>,
        counters: Arc<TransferCounters>,
    ) -> Self {
        let chunk = if max_speed > 0 {
            usize::try_from((max_speed >> 3).clamp(1, as_u64(MAX_CHUNK))).unwrap_or(MAX_CHUNK)
        } else {
            MAX_CHUNK
        };
        if data.is_empty() {
            counters.upload_done.store(true, Ordering::SeqCst);
        }
        Self {
            data,
            sent: 0,
            chunk,
            max_speed,
            started: None,
            progress,
            counters,
            delay: None,
        }
    }
}

impl http_body::Body for UploadBody {
    type Data = Bytes;
    type Error = Cancelled;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        loop {
            if let Some(delay) = this.delay.as_mut().as_pin_mut() {
                ready!(delay.poll(cx));
                this.delay.set(None);
            }

            let total = this.data.len();
            if *this.sent >= total {
                this.counters.upload_done.store(true, Ordering::SeqCst);
                return Poll::Ready(None);
            }

            if *this.max_speed > 0 {
                let started = *this.started.get_or_insert_with(Instant::now);
                if let Some(wait) =
                    throttle_delay(as_u64(*this.sent), *this.max_speed, started.elapsed())
                {
                    this.delay.set(Some(tokio::time::sleep(wait)));
                    continue;
                }
            }

            let end = this.sent.saturating_add(*this.chunk).min(total);
            let chunk = this.data.slice(*this.sent..end);
            *this.sent = end;
            this.counters.uploaded.store(as_u64(end), Ordering::SeqCst);
            if let Err(cancelled) = this.progress.upload(as_u64(end), as_u64(total)) {
                return Poll::Ready(Some(Err(cancelled)));
            }
            return Poll::Ready(Some(Ok(Frame::data(chunk))));
        }
    }

    fn is_end_stream(&self) -> bool {
        self.sent >= self.data.len()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(as_u64(self.data.len().saturating_sub(self.sent)))
    }
}
