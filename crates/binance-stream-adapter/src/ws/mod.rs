/*
[INPUT]:  Stream endpoint, channel descriptors, session collaborator
[OUTPUT]: Resilient subscriptions delivering normalized events
[POS]:    WebSocket layer - real-time data streams
[UPDATE]: When adding channel kinds or changing connection lifecycle
*/

pub mod channel;
pub mod client;
pub mod group;
pub mod message;
pub mod reconnect;
pub mod transport;
pub mod user;

pub use channel::{ChannelHandle, ChannelOpener, ChannelState, MessageHandler};
pub use client::{STREAM_BASE_URL, StreamClient, StreamConfig};
pub use group::{GroupHandle, open_many};
pub use message::{
    ALL_TICKERS_PATH, MarketEvent, StreamKind, decode_all_tickers, decode_candle, decode_depth,
    decode_partial_depth, decode_ticker, decode_trade, decode_user_event,
};
pub use reconnect::{DEFAULT_RECONNECT_DELAY, ReconnectPolicy};
pub use transport::{Connection, Transport, TransportEvent, TungsteniteTransport};
pub use user::{DEFAULT_KEEPALIVE_INTERVAL, UserStreamHandle};
