//! Cancellation and deadlines (§5). Every blocking channel operation
//! accepts a [`CancellationToken`]; the reference shape here is
//! `tokio_util::sync::CancellationToken`, but that crate isn't part of
//! the dependency stack this driver carries, so this is a direct,
//! minimal `Notify`-backed equivalent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{Error, Result};

/// A cooperatively-checked cancellation signal, cloneable and shareable
/// across tasks. Cloning shares the same underlying flag.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    notify: Notify,
    canceled: std::sync::atomic::AtomicBool,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.inner
            .canceled
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Resolves once `cancel()` is called. A no-op if already canceled.
    pub async fn canceled(&self) {
        if self.is_canceled() {
            return;
        }
        self.inner.notify.notified().await;
    }

    /// Runs `fut` to completion, racing it against cancellation and
    /// (optionally) a deadline. The channel-level cleanup (sending an
    /// attention packet and draining the server's `Done`) is the
    /// caller's responsibility once this returns `Canceled` or
    /// `DeadlineExceeded` -- this type only carries the signal.
    pub async fn race<F, T>(&self, fut: F, deadline: Option<Duration>) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        match deadline {
            Some(d) => {
                tokio::select! {
                    result = fut => result,
                    _ = self.canceled() => Err(Error::Canceled),
                    _ = tokio::time::sleep(d) => Err(Error::DeadlineExceeded),
                }
            }
            None => {
                tokio::select! {
                    result = fut => result,
                    _ = self.canceled() => Err(Error::Canceled),
                }
            }
        }
    }
}

/// The token every blocking operation in §5 accepts: a cancellation
/// signal plus an optional absolute deadline, bundled the way a Go
/// `context.Context` bundles both into the one value callers thread
/// through `conn.exec(ctx, ...)` etc. (§6). Cheap to clone -- `Rows`
/// holds its own copy of the `Context` an `exec` call was made with, so
/// every `next_package` it drives afterward still honors it.
#[derive(Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<tokio::time::Instant>,
}

impl Context {
    /// No cancellation, no deadline -- `context.Background()`.
    pub fn background() -> Self {
        Context::default()
    }

    pub fn with_cancel(token: CancellationToken) -> Self {
        Context {
            token,
            deadline: None,
        }
    }

    pub fn with_timeout(duration: Duration) -> Self {
        Context {
            token: CancellationToken::new(),
            deadline: Some(tokio::time::Instant::now() + duration),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Resolves once this context's cancellation fires or its deadline
    /// (if any) elapses. Never resolves for a bare [`Context::background`].
    pub async fn stopped(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.canceled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.canceled().await,
        }
    }

    /// The error a blocking operation should surface once [`Context::stopped`]
    /// has resolved: `Canceled` if the caller asked for it, `DeadlineExceeded`
    /// if it was the clock instead.
    pub fn stop_error(&self) -> Error {
        if self.token.is_canceled() {
            Error::Canceled
        } else {
            Error::DeadlineExceeded
        }
    }
}
