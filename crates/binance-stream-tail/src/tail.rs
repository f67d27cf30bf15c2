/*
[INPUT]:  Validated tail configuration, stream client, line sink
[OUTPUT]: Open subscriptions emitting one JSON line per normalized event
[POS]:    Runner layer - subscription lifecycle for the tail binary
[UPDATE]: When adding output formats or subscription sources
*/

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use binance_stream_adapter::{GroupHandle, StreamClient, UserEvent, UserStreamHandle};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::TailConfig;

/// Receives every rendered output line
pub type LineSink = Arc<dyn Fn(String) + Send + Sync>;

/// Sink writing lines to stdout
pub fn stdout_sink() -> LineSink {
    Arc::new(|line: String| {
        let mut stdout = std::io::stdout().lock();
        if writeln!(stdout, "{line}").is_err() {
            warn!("stdout closed; event line dropped");
        }
    })
}

#[derive(Serialize)]
struct UserLine<'a> {
    channel: &'static str,
    data: &'a UserEvent,
}

fn emit<T: Serialize>(sink: &LineSink, value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => sink(line),
        Err(err) => warn!(error = %err, "failed to render event line"),
    }
}

/// Every subscription opened from one configuration
#[derive(Debug)]
pub struct Tail {
    market: Vec<GroupHandle>,
    user: Option<UserStreamHandle>,
}

impl Tail {
    /// Open every configured subscription.
    ///
    /// On error, subscriptions opened so far are torn down before returning.
    pub async fn start(
        config: &TailConfig,
        client: &StreamClient,
        sink: LineSink,
    ) -> anyhow::Result<Self> {
        let mut market = Vec::with_capacity(config.subscriptions.len());
        for (index, subscription) in config.subscriptions.iter().enumerate() {
            let sink = sink.clone();
            let handle = client
                .subscribe(
                    subscription.kind,
                    subscription.symbols.clone(),
                    move |event| emit(&sink, &event),
                )
                .with_context(|| {
                    format!("open subscriptions[{index}] ({})", subscription.kind.name())
                })?;
            info!(
                channel = subscription.kind.name(),
                paths = ?handle.paths(),
                "subscription opened"
            );
            market.push(handle);
        }

        let user = if config.user_stream.enabled {
            let sink = sink.clone();
            let handle = client
                .user(move |event| {
                    emit(
                        &sink,
                        &UserLine {
                            channel: "userData",
                            data: &event,
                        },
                    )
                })
                .await
                .context("open user data stream")?;
            info!("user data stream opened");
            Some(handle)
        } else {
            None
        };

        Ok(Self { market, user })
    }

    /// Number of underlying channels
    pub fn channel_count(&self) -> usize {
        self.market.iter().map(GroupHandle::len).sum::<usize>() + usize::from(self.user.is_some())
    }

    /// Tear everything down and wait until every channel is closed
    pub async fn shutdown(self) -> anyhow::Result<()> {
        for handle in &self.market {
            handle.teardown();
        }

        let mut result = Ok(());
        if let Some(user) = &self.user {
            result = user.teardown().await.context("tear down user data stream");
            user.closed().await;
        }

        for handle in &self.market {
            handle.closed().await;
        }
        info!("all subscriptions closed");
        result
    }
}
