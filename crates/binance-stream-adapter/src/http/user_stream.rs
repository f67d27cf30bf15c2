/*
[INPUT]:  API key and listen keys
[OUTPUT]: Listen key lifecycle (issue, keepalive, invalidate)
[POS]:    HTTP layer - user data stream session endpoints (require API key)
[UPDATE]: When the user data stream endpoints or session contract change
*/

use async_trait::async_trait;
use reqwest::Method;

use crate::http::{BinanceClient, Result};
use crate::types::ListenKey;

const USER_DATA_STREAM_ENDPOINT: &str = "/api/v3/userDataStream";

/// Session collaborator backing a user data stream.
///
/// The stream socket is addressed by the listen key; the key must be kept alive
/// periodically and invalidated when the stream is no longer needed.
#[async_trait]
pub trait DataStreamSession: Send + Sync {
    /// Issue a new listen key
    async fn get_data_stream(&self) -> Result<ListenKey>;

    /// Extend the validity window of a listen key
    async fn keep_data_stream(&self, listen_key: &str) -> Result<()>;

    /// Invalidate a listen key
    async fn close_data_stream(&self, listen_key: &str) -> Result<()>;
}

impl BinanceClient {
    /// Create a listen key
    ///
    /// POST /api/v3/userDataStream
    pub async fn create_listen_key(&self) -> Result<ListenKey> {
        let builder = self.request_with_api_key(Method::POST, USER_DATA_STREAM_ENDPOINT)?;
        self.send_json(builder).await
    }

    /// Keep a listen key alive
    ///
    /// PUT /api/v3/userDataStream?listenKey={listen_key}
    pub async fn keepalive_listen_key(&self, listen_key: &str) -> Result<()> {
        let builder = self
            .request_with_api_key(Method::PUT, USER_DATA_STREAM_ENDPOINT)?
            .query(&[("listenKey", listen_key)]);
        self.send_empty(builder).await
    }

    /// Close a listen key
    ///
    /// DELETE /api/v3/userDataStream?listenKey={listen_key}
    pub async fn close_listen_key(&self, listen_key: &str) -> Result<()> {
        let builder = self
            .request_with_api_key(Method::DELETE, USER_DATA_STREAM_ENDPOINT)?
            .query(&[("listenKey", listen_key)]);
        self.send_empty(builder).await
    }
}

#[async_trait]
impl DataStreamSession for BinanceClient {
    async fn get_data_stream(&self) -> Result<ListenKey> {
        self.create_listen_key().await
    }

    async fn keep_data_stream(&self, listen_key: &str) -> Result<()> {
        self.keepalive_listen_key(listen_key).await
    }

    async fn close_data_stream(&self, listen_key: &str) -> Result<()> {
        self.close_listen_key(listen_key).await
    }
}
