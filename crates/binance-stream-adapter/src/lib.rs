/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public Binance stream adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod http;
pub mod types;
pub mod ws;

// Re-export commonly used types from http
pub use http::{
    BinanceClient,
    ClientConfig,
    Credentials,
    DataStreamSession,
    Result,
    StreamError,
};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    ChannelHandle,
    ChannelState,
    GroupHandle,
    MarketEvent,
    ReconnectPolicy,
    StreamClient,
    StreamConfig,
    StreamKind,
    Transport,
    TungsteniteTransport,
    UserStreamHandle,
};
