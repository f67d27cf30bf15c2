/*
[INPUT]:  HTTP client configuration and API endpoints
[OUTPUT]: HTTP responses and typed API results
[POS]:    HTTP layer - REST API communication (session collaborator)
[UPDATE]: When adding new endpoints or changing client behavior
*/

pub mod client;
pub mod error;
pub mod user_stream;

pub use error::{Result, StreamError};
pub use user_stream::DataStreamSession;

pub use client::{BinanceClient, ClientConfig, Credentials};
