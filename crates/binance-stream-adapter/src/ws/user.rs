/*
[INPUT]:  Session collaborator, keepalive period, user event callback
[OUTPUT]: Live user data stream bound to a listen key + teardown handle
[POS]:    WebSocket layer - listen key lifecycle (issue, renew, invalidate)
[UPDATE]: When changing keepalive cadence or teardown ordering
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::http::{DataStreamSession, Result, StreamError};
use crate::types::UserEvent;
use crate::ws::channel::{ChannelHandle, ChannelOpener, ChannelState};
use crate::ws::message::{decode_user_event, decoding_handler};

pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(50);

/// Open a user data stream.
///
/// The listen key is issued first; if that fails nothing is connected. Once the
/// channel is open the key is renewed immediately and then every `keepalive_interval`.
pub async fn open<C>(
    opener: &ChannelOpener,
    session: Arc<dyn DataStreamSession>,
    keepalive_interval: Duration,
    callback: C,
) -> Result<UserStreamHandle>
where
    C: Fn(UserEvent) + Send + Sync + 'static,
{
    if keepalive_interval.is_zero() {
        return Err(StreamError::config("keepalive interval must be positive"));
    }

    let listen_key = session.get_data_stream().await?.listen_key;
    if listen_key.trim().is_empty() {
        return Err(StreamError::InvalidResponse(
            "session issued an empty listen key".to_string(),
        ));
    }

    let handler = decoding_handler("userData", decode_user_event, Arc::new(callback));
    let channel = match opener.open(&listen_key, handler) {
        Ok(channel) => channel,
        Err(err) => {
            if let Err(close_err) = session.close_data_stream(&listen_key).await {
                warn!(error = %close_err, "failed to invalidate listen key after open failure");
            }
            return Err(err);
        }
    };

    let shutdown = CancellationToken::new();
    let keepalive = tokio::spawn(keepalive_loop(
        session.clone(),
        listen_key.clone(),
        keepalive_interval,
        shutdown.clone(),
    ));
    info!(?keepalive_interval, "user data stream opened");

    Ok(UserStreamHandle {
        listen_key,
        session,
        channel,
        shutdown,
        keepalive: Mutex::new(Some(keepalive)),
        torn_down: AtomicBool::new(false),
        invalidated: AtomicBool::new(false),
    })
}

async fn keepalive_loop(
    session: Arc<dyn DataStreamSession>,
    listen_key: String,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // first tick completes immediately
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(renewed) = renew(session.as_ref(), &listen_key, &shutdown).await else {
            break;
        };
        let err = match renewed {
            Ok(()) => {
                debug!("listen key renewed");
                continue;
            }
            Err(err) => err,
        };
        if !err.is_retryable() {
            warn!(error = %err, "listen key renewal failed");
            continue;
        }

        // one retry within the period for transient failures
        let delay = Duration::from_secs(err.retry_delay().unwrap_or(1)).min(period);
        warn!(error = %err, ?delay, "listen key renewal failed; retrying");
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        match renew(session.as_ref(), &listen_key, &shutdown).await {
            None => break,
            Some(Ok(())) => debug!("listen key renewed on retry"),
            Some(Err(err)) => warn!(error = %err, "listen key renewal retry failed"),
        }
    }

    debug!("listen key keepalive stopped");
}

/// `None` when shutdown won the race
async fn renew(
    session: &dyn DataStreamSession,
    listen_key: &str,
    shutdown: &CancellationToken,
) -> Option<Result<()>> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        result = session.keep_data_stream(listen_key) => Some(result),
    }
}

/// Owns the listen key, its keepalive task and the stream channel.
///
/// Dropping the handle without calling [`UserStreamHandle::teardown`] still stops
/// renewal and closes the channel; the key is invalidated in the background.
#[must_use = "dropping a UserStreamHandle ends the user data stream"]
pub struct UserStreamHandle {
    listen_key: String,
    session: Arc<dyn DataStreamSession>,
    channel: ChannelHandle,
    shutdown: CancellationToken,
    keepalive: Mutex<Option<JoinHandle<()>>>,
    torn_down: AtomicBool,
    /// Set once `close_data_stream` has completed; a teardown future dropped
    /// before that point leaves the release to `Drop`.
    invalidated: AtomicBool,
}

impl std::fmt::Debug for UserStreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserStreamHandle")
            .field("channel", &self.channel)
            .field("torn_down", &self.torn_down)
            .finish_non_exhaustive()
    }
}

impl UserStreamHandle {
    pub fn listen_key(&self) -> &str {
        &self.listen_key
    }

    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Stop renewal, invalidate the listen key, close the channel.
    ///
    /// Renewal is stopped and joined before invalidation starts. Once the key
    /// has been invalidated, later calls return `Ok(())` without touching the
    /// session. If this future is dropped before invalidation completes, the
    /// handle's `Drop` still releases the key.
    pub async fn teardown(&self) -> Result<()> {
        if self.invalidated.load(Ordering::Acquire) {
            return Ok(());
        }
        self.torn_down.store(true, Ordering::Release);

        self.shutdown.cancel();
        let keepalive = self
            .keepalive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = keepalive {
            if let Err(err) = task.await {
                warn!(error = %err, "listen key keepalive task ended abnormally");
            }
        }

        let invalidated = self.session.close_data_stream(&self.listen_key).await;
        self.invalidated.store(true, Ordering::Release);
        self.channel.teardown();

        match &invalidated {
            Ok(()) => info!("user data stream torn down"),
            Err(err) => warn!(error = %err, "listen key invalidation failed"),
        }
        invalidated
    }

    /// Resolves once the stream channel is closed
    pub async fn closed(&self) {
        self.channel.closed().await;
    }
}

impl Drop for UserStreamHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.channel.teardown();

        if self.invalidated.swap(true, Ordering::AcqRel) {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let session = self.session.clone();
                let listen_key = std::mem::take(&mut self.listen_key);
                runtime.spawn(async move {
                    if let Err(err) = session.close_data_stream(&listen_key).await {
                        warn!(error = %err, "listen key invalidation failed on drop");
                    }
                });
            }
            Err(_) => warn!("user stream handle dropped outside a runtime; listen key left to expire"),
        }
    }
}
