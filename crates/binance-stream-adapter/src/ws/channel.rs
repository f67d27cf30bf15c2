/*
[INPUT]:  Channel path, message handler, transport, reconnect policy
[OUTPUT]: One self-healing subscription + teardown handle
[POS]:    WebSocket layer - per-channel connection lifecycle and reconnect
[UPDATE]: When changing reconnect semantics or teardown guarantees
*/

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::http::{Result, StreamError};
use crate::ws::reconnect::ReconnectPolicy;
use crate::ws::transport::{Connection, Transport, TransportEvent};

/// Receives every raw text message of a channel
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Lifecycle of a channel. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Reconnecting { attempt: u32 },
    Closed,
}

/// Shared settings used to open channels against one endpoint
#[derive(Clone)]
pub struct ChannelOpener {
    transport: Arc<dyn Transport>,
    base_url: String,
    policy: ReconnectPolicy,
}

impl fmt::Debug for ChannelOpener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelOpener")
            .field("base_url", &self.base_url)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ChannelOpener {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        policy: ReconnectPolicy,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            transport,
            base_url,
            policy,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full address of a channel path
    pub fn url_for(&self, path: &str) -> Result<String> {
        if path.is_empty() {
            return Err(StreamError::config("channel path must not be empty"));
        }
        if path.contains('{') || path.contains('}') {
            return Err(StreamError::config(format!(
                "channel path has unresolved parameters: {path}"
            )));
        }
        let url = Url::parse(&format!("{}/{}", self.base_url, path))?;
        Ok(url.to_string())
    }

    /// Open one resilient channel.
    ///
    /// The channel connects in the background, feeds every message to `handler`,
    /// and reconnects after each disconnect until the returned handle is torn down.
    pub fn open(&self, path: &str, handler: MessageHandler) -> Result<ChannelHandle> {
        let url = self.url_for(path)?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            StreamError::config("opening a stream channel requires a running Tokio runtime")
        })?;

        let shutdown = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);

        let worker = ChannelWorker {
            transport: self.transport.clone(),
            url,
            path: path.to_string(),
            policy: self.policy,
            handler,
            shutdown: shutdown.clone(),
            state: state_tx,
        };
        runtime.spawn(worker.run());

        Ok(ChannelHandle {
            path: path.to_string(),
            shutdown,
            state: state_rx,
        })
    }
}

/// Teardown handle for one channel.
///
/// Dropping the handle tears the channel down as well.
#[derive(Debug)]
#[must_use = "dropping a ChannelHandle tears the channel down"]
pub struct ChannelHandle {
    path: String,
    shutdown: CancellationToken,
    state: watch::Receiver<ChannelState>,
}

impl ChannelHandle {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    pub fn is_torn_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop the channel: no connection is opened after this call. Idempotent.
    pub fn teardown(&self) {
        if !self.shutdown.is_cancelled() {
            debug!(path = %self.path, "stream channel teardown requested");
        }
        self.shutdown.cancel();
    }

    /// Resolves once the channel reached `Closed` and its connection was released
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|state| *state == ChannelState::Closed).await;
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct ChannelWorker {
    transport: Arc<dyn Transport>,
    url: String,
    path: String,
    policy: ReconnectPolicy,
    handler: MessageHandler,
    shutdown: CancellationToken,
    state: watch::Sender<ChannelState>,
}

#[derive(Debug)]
enum PumpExit {
    Shutdown,
    Disconnected(String),
}

impl ChannelWorker {
    async fn run(self) {
        let mut attempt: u32 = 0;

        'run: loop {
            if self.shutdown.is_cancelled() {
                break 'run;
            }

            self.set_state(ChannelState::Connecting);
            let connected = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break 'run,
                result = self.transport.connect(&self.url) => result,
            };

            match connected {
                Ok(mut connection) => {
                    attempt = 0;
                    self.set_state(ChannelState::Open);
                    info!(path = %self.path, "stream channel connected");

                    match self.pump(connection.as_mut()).await {
                        PumpExit::Shutdown => {
                            connection.close().await;
                            break 'run;
                        }
                        PumpExit::Disconnected(reason) => {
                            warn!(path = %self.path, %reason, "stream channel disconnected");
                        }
                    }
                }
                Err(err) => {
                    warn!(path = %self.path, error = %err, "stream channel connect failed");
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = self.policy.delay(attempt);
            self.set_state(ChannelState::Reconnecting { attempt });
            debug!(path = %self.path, attempt, ?delay, "stream channel reconnect scheduled");

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break 'run,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ChannelState::Closed);
        info!(path = %self.path, "stream channel closed");
    }

    async fn pump(&self, connection: &mut dyn Connection) -> PumpExit {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return PumpExit::Shutdown,
                event = connection.next_event() => match event {
                    TransportEvent::Message(text) => self.dispatch(&text),
                    TransportEvent::Error(reason) => return PumpExit::Disconnected(reason),
                    TransportEvent::Close => {
                        return PumpExit::Disconnected("closed by remote".to_string());
                    }
                },
            }
        }
    }

    fn dispatch(&self, raw: &str) {
        let handler = &self.handler;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(raw))) {
            error!(
                path = %self.path,
                reason = panic_message(panic.as_ref()),
                "stream message handler panicked; channel keeps listening"
            );
        }
    }

    fn set_state(&self, state: ChannelState) {
        self.state.send_replace(state);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
