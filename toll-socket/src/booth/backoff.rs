use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures::{FutureExt, Stream};
use tokio::time::sleep;

use crate::booth::BoothOptions;

/// Yields once per elapsed backoff period, doubling the period each time up to a cap.
/// Ends after `max_retries` items, if set.
pub struct ExponentialBackoff {
    retry_count: usize,
    max_retries: Option<usize>,
    backoff: Duration,
    max_backoff: Duration,
    /// `Sleep` is not `Unpin`, so it lives behind a pinned box.
    timeout: Option<Pin<Box<tokio::time::Sleep>>>,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max_backoff: Duration, max_retries: Option<usize>) -> Self {
        Self { retry_count: 0, max_retries, backoff: initial, max_backoff, timeout: None }
    }

    pub fn retry_count(&self) -> usize {
        self.retry_count
    }

    fn reset_timeout(&mut self) {
        self.timeout = Some(Box::pin(sleep(self.backoff)));
    }
}

impl From<&BoothOptions> for ExponentialBackoff {
    fn from(options: &BoothOptions) -> Self {
        Self::new(options.backoff_duration, options.max_backoff, options.retry_attempts)
    }
}

impl Stream for ExponentialBackoff {
    type Item = Duration;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(max_retries) = this.max_retries {
            if this.retry_count >= max_retries {
                return Poll::Ready(None);
            }
        }

        if this.timeout.is_none() {
            this.reset_timeout();
        }

        let Some(ref mut timeout) = this.timeout else {
            return Poll::Pending;
        };

        if timeout.poll_unpin(cx).is_pending() {
            return Poll::Pending;
        }

        let waited = this.backoff;
        this.retry_count += 1;
        this.backoff = (this.backoff * 2).min(this.max_backoff);
        this.timeout = None;

        Poll::Ready(Some(waited))
    }
}
