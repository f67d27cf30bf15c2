/*
[INPUT]:  Stream endpoint configuration, optional session collaborator
[OUTPUT]: One subscribe function per channel kind, each returning a teardown handle
[POS]:    WebSocket layer - client facade over channels, groups and user stream
[UPDATE]: When adding channel kinds or changing subscribe signatures
*/

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::http::{DataStreamSession, Result, StreamError};
use crate::types::{
    CandleEvent, DepthEvent, IntoSubscriptions, KlineInterval, PartialDepthEvent,
    PartialDepthParams, TickerEvent, TradeEvent, UserEvent,
};
use crate::ws::channel::ChannelOpener;
use crate::ws::group::{GroupHandle, open_many};
use crate::ws::message::{
    ALL_TICKERS_PATH, MarketEvent, StreamKind, decode_all_tickers, decode_candle, decode_depth,
    decode_partial_depth, decode_ticker, decode_trade, decoding_handler,
};
use crate::ws::reconnect::ReconnectPolicy;
use crate::ws::transport::{Transport, TungsteniteTransport};
use crate::ws::user::{self, DEFAULT_KEEPALIVE_INTERVAL, UserStreamHandle};

pub const STREAM_BASE_URL: &str = "wss://stream.binance.com:9443/ws";

/// Stream client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub base_url: String,
    pub reconnect: ReconnectPolicy,
    pub keepalive_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: STREAM_BASE_URL.to_string(),
            reconnect: ReconnectPolicy::default(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }
}

/// Entry point for every subscription.
///
/// Each subscribe call opens one channel per symbol (the all-tickers channel is
/// shared) and returns a handle that tears all of them down.
#[derive(Clone)]
pub struct StreamClient {
    opener: ChannelOpener,
    keepalive_interval: Duration,
    session: Option<Arc<dyn DataStreamSession>>,
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("opener", &self.opener)
            .field("keepalive_interval", &self.keepalive_interval)
            .field("has_session", &self.session.is_some())
            .finish()
    }
}

impl Default for StreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamClient {
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    pub fn with_config(config: StreamConfig) -> Self {
        Self::with_transport(config, Arc::new(TungsteniteTransport))
    }

    pub fn with_transport(config: StreamConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            opener: ChannelOpener::new(transport, config.base_url, config.reconnect),
            keepalive_interval: config.keepalive_interval,
            session: None,
        }
    }

    /// Attach the collaborator that issues and renews user stream listen keys
    pub fn with_session(mut self, session: Arc<dyn DataStreamSession>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn base_url(&self) -> &str {
        self.opener.base_url()
    }

    /// Order book deltas (`{symbol}@depth`)
    pub fn depth<S, F>(&self, symbols: S, callback: F) -> Result<GroupHandle>
    where
        S: IntoSubscriptions<String>,
        F: Fn(DepthEvent) + Send + Sync + 'static,
    {
        self.open_symbols(StreamKind::Depth, symbols, decode_depth, callback)
    }

    /// Order book snapshots (`{symbol}@depth{level}`)
    pub fn partial_depth<P, F>(&self, params: P, callback: F) -> Result<GroupHandle>
    where
        P: IntoSubscriptions<PartialDepthParams>,
        F: Fn(PartialDepthEvent) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let handle = open_many(
            &self.opener,
            params,
            |params: &PartialDepthParams| {
                StreamKind::PartialDepth {
                    level: params.level,
                }
                .path(&params.symbol)
            },
            |params, path| {
                let symbol = params.symbol.clone();
                let level = params.level;
                decoding_handler(
                    path,
                    move |raw: &str| decode_partial_depth(raw, &symbol, level),
                    callback.clone(),
                )
            },
        )?;
        log_subscribed("partialDepth", &handle);
        Ok(handle)
    }

    /// Candles (`{symbol}@kline_{interval}`).
    ///
    /// An empty or unknown interval fails before any connection attempt.
    pub fn candles<S, F>(&self, symbols: S, interval: &str, callback: F) -> Result<GroupHandle>
    where
        S: IntoSubscriptions<String>,
        F: Fn(CandleEvent) + Send + Sync + 'static,
    {
        let interval: KlineInterval = interval.parse()?;
        self.open_symbols(
            StreamKind::Candles { interval },
            symbols,
            decode_candle,
            callback,
        )
    }

    /// Aggregated trades (`{symbol}@aggTrade`)
    pub fn trades<S, F>(&self, symbols: S, callback: F) -> Result<GroupHandle>
    where
        S: IntoSubscriptions<String>,
        F: Fn(TradeEvent) + Send + Sync + 'static,
    {
        self.open_symbols(StreamKind::Trades, symbols, decode_trade, callback)
    }

    /// 24h rolling tickers (`{symbol}@ticker`)
    pub fn ticker<S, F>(&self, symbols: S, callback: F) -> Result<GroupHandle>
    where
        S: IntoSubscriptions<String>,
        F: Fn(TickerEvent) + Send + Sync + 'static,
    {
        self.open_symbols(StreamKind::Ticker, symbols, decode_ticker, callback)
    }

    /// Every symbol's ticker on one shared channel; one callback per batch
    pub fn all_tickers<F>(&self, callback: F) -> Result<GroupHandle>
    where
        F: Fn(Vec<TickerEvent>) + Send + Sync + 'static,
    {
        let handler = decoding_handler(ALL_TICKERS_PATH, decode_all_tickers, Arc::new(callback));
        let handle = GroupHandle::new(vec![self.opener.open(ALL_TICKERS_PATH, handler)?]);
        log_subscribed("allTickers", &handle);
        Ok(handle)
    }

    /// Subscribe by channel kind; events arrive as [`MarketEvent`].
    ///
    /// `symbols` is ignored for [`StreamKind::AllTickers`].
    pub fn subscribe<S, F>(&self, kind: StreamKind, symbols: S, callback: F) -> Result<GroupHandle>
    where
        S: IntoSubscriptions<String>,
        F: Fn(MarketEvent) + Send + Sync + 'static,
    {
        kind.validate()?;
        let callback = Arc::new(callback);

        let handle = if kind.is_per_symbol() {
            open_many(
                &self.opener,
                symbols,
                |symbol: &String| kind.path(symbol),
                |symbol, path| {
                    let symbol = symbol.clone();
                    decoding_handler(
                        path,
                        move |raw: &str| kind.decode(&symbol, raw),
                        callback.clone(),
                    )
                },
            )?
        } else {
            let handler = decoding_handler(
                ALL_TICKERS_PATH,
                move |raw: &str| kind.decode("", raw),
                callback,
            );
            GroupHandle::new(vec![self.opener.open(ALL_TICKERS_PATH, handler)?])
        };

        log_subscribed(kind.name(), &handle);
        Ok(handle)
    }

    /// User data stream bound to a freshly issued listen key
    pub async fn user<F>(&self, callback: F) -> Result<UserStreamHandle>
    where
        F: Fn(UserEvent) + Send + Sync + 'static,
    {
        let session = self.session.clone().ok_or_else(|| {
            StreamError::config("user data stream requires a session collaborator")
        })?;
        user::open(&self.opener, session, self.keepalive_interval, callback).await
    }

    fn open_symbols<S, T, D, F>(
        &self,
        kind: StreamKind,
        symbols: S,
        decode: D,
        callback: F,
    ) -> Result<GroupHandle>
    where
        S: IntoSubscriptions<String>,
        T: 'static,
        D: Fn(&str) -> Result<T> + Copy + Send + Sync + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let handle = open_many(
            &self.opener,
            symbols,
            |symbol: &String| kind.path(symbol),
            |_, path| decoding_handler(path, decode, callback.clone()),
        )?;
        log_subscribed(kind.name(), &handle);
        Ok(handle)
    }
}

fn log_subscribed(channel: &'static str, handle: &GroupHandle) {
    info!(channel, channels = handle.len(), paths = ?handle.paths(), "stream subscribed");
}
