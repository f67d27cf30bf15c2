/*
[INPUT]:  Test scenarios needing a transport, a session, or a mock REST server
[OUTPUT]: In-memory transport/session doubles, payload fixtures, mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for binance-stream-adapter tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use binance_stream_adapter::ws::{Connection, Transport, TransportEvent};
use binance_stream_adapter::{
    DataStreamSession, ListenKey, ReconnectPolicy, Result, StreamClient, StreamConfig, StreamError,
};
use tokio::sync::mpsc;
use wiremock::MockServer;

pub const TEST_BASE_URL: &str = "wss://stream.test/ws";
pub const TEST_LISTEN_KEY: &str = "pqia91ma19a5s61cv6a81va65sdf19v8a65a1a5s61cv6a81va65sdf19v8a65a1";

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Let spawned tasks run until they park
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Sleep on the (paused) test clock, then let woken tasks run
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}

pub fn test_config() -> StreamConfig {
    StreamConfig {
        base_url: TEST_BASE_URL.to_string(),
        reconnect: ReconnectPolicy::Fixed(Duration::from_secs(1)),
        keepalive_interval: Duration::from_secs(50),
    }
}

pub fn url(path: &str) -> String {
    format!("{TEST_BASE_URL}/{path}")
}

/// Test-side end of one live mock connection
pub struct ConnectionControl {
    pub url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
}

impl ConnectionControl {
    pub fn message(&self, raw: &str) {
        let _ = self.events.send(TransportEvent::Message(raw.to_string()));
    }

    pub fn error(&self, reason: &str) {
        let _ = self.events.send(TransportEvent::Error(reason.to_string()));
    }

    pub fn close(&self) {
        let _ = self.events.send(TransportEvent::Close);
    }

    /// Whether the channel closed this connection itself
    pub fn was_closed_locally(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// In-memory transport recording every connection attempt
#[derive(Default)]
pub struct MockTransport {
    connects: Mutex<Vec<String>>,
    failures_left: AtomicUsize,
    local_closes: Arc<AtomicUsize>,
    controls: Mutex<Option<mpsc::UnboundedSender<ConnectionControl>>>,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ConnectionControl>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            controls: Mutex::new(Some(tx)),
            ..Self::default()
        };
        (Arc::new(transport), rx)
    }

    /// Fail the next `count` connection attempts
    pub fn fail_next_connects(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }

    pub fn connected_urls(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }

    /// Connections the channels closed themselves (teardown)
    pub fn local_close_count(&self) -> usize {
        self.local_closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
        self.connects.lock().unwrap().push(url.to_string());

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StreamError::WebSocket("connection refused".to_string()));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        if let Some(controls) = self.controls.lock().unwrap().as_ref() {
            let _ = controls.send(ConnectionControl {
                url: url.to_string(),
                events: events_tx.clone(),
                closed: closed.clone(),
            });
        }

        Ok(Box::new(MockConnection {
            events: events_rx,
            _keep_open: events_tx,
            closed,
            local_closes: self.local_closes.clone(),
        }))
    }
}

struct MockConnection {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    // the connection stays open even after the test drops its control
    _keep_open: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
    local_closes: Arc<AtomicUsize>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn next_event(&mut self) -> TransportEvent {
        self.events.recv().await.unwrap_or(TransportEvent::Close)
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.local_closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Session collaborator counting every call
pub struct MockSession {
    listen_key: String,
    fail_get: AtomicBool,
    fail_keep: AtomicBool,
    timed_out_keeps: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub keep_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub closed_keys: Mutex<Vec<String>>,
}

impl MockSession {
    pub fn new() -> Arc<Self> {
        Self::with_listen_key(TEST_LISTEN_KEY)
    }

    pub fn with_listen_key(listen_key: &str) -> Arc<Self> {
        Arc::new(Self {
            listen_key: listen_key.to_string(),
            fail_get: AtomicBool::new(false),
            fail_keep: AtomicBool::new(false),
            timed_out_keeps: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            keep_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            closed_keys: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        let session = Self::new();
        session.fail_get.store(true, Ordering::SeqCst);
        session
    }

    pub fn fail_keepalive(&self, fail: bool) {
        self.fail_keep.store(fail, Ordering::SeqCst);
    }

    /// The next `count` keepalive calls fail with a retryable timeout
    pub fn time_out_next_keeps(&self, count: usize) {
        self.timed_out_keeps.store(count, Ordering::SeqCst);
    }

    pub fn keeps(&self) -> usize {
        self.keep_calls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataStreamSession for MockSession {
    async fn get_data_stream(&self) -> Result<ListenKey> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(StreamError::Api {
                code: -2015,
                message: "Invalid API-key, IP, or permissions for action.".to_string(),
            });
        }
        Ok(ListenKey {
            listen_key: self.listen_key.clone(),
        })
    }

    async fn keep_data_stream(&self, _listen_key: &str) -> Result<()> {
        self.keep_calls.fetch_add(1, Ordering::SeqCst);
        let timed_out = self
            .timed_out_keeps
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if timed_out {
            return Err(StreamError::Timeout { duration: 30 });
        }
        if self.fail_keep.load(Ordering::SeqCst) {
            return Err(StreamError::Api {
                code: -1125,
                message: "This listenKey does not exist.".to_string(),
            });
        }
        Ok(())
    }

    async fn close_data_stream(&self, listen_key: &str) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed_keys.lock().unwrap().push(listen_key.to_string());
        Ok(())
    }
}

pub fn mock_client() -> (
    StreamClient,
    Arc<MockTransport>,
    mpsc::UnboundedReceiver<ConnectionControl>,
) {
    let (transport, controls) = MockTransport::new();
    let client = StreamClient::with_transport(test_config(), transport.clone());
    (client, transport, controls)
}

/// Collects callback arguments for later assertions
pub fn collector<T: Send + 'static>() -> (
    impl Fn(T) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<T>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |event: T| {
            let _ = tx.send(event);
        },
        rx,
    )
}

pub const DEPTH_UPDATE: &str = r#"{"e":"depthUpdate","E":123456789,"s":"BNBBTC","U":157,"u":160,"b":[["0.0024","10"],["0.0023","5"]],"a":[["0.0026","100"]]}"#;

pub const AGG_TRADE: &str = r#"{"e":"aggTrade","E":123456789,"s":"BNBBTC","a":12345,"p":"0.001","q":"100","f":100,"l":105,"T":123456785,"m":true,"M":true}"#;

pub const PARTIAL_DEPTH: &str = r#"{"lastUpdateId":160,"bids":[["0.0024","10"]],"asks":[["0.0026","100"]]}"#;

pub const TICKER: &str = r#"{"e":"24hrTicker","E":123456789,"s":"BNBBTC","p":"0.0015","P":"250.00","w":"0.0018","x":"0.0009","c":"0.0025","Q":"10","b":"0.0024","B":"10","a":"0.0026","A":"100","o":"0.0010","h":"0.0025","l":"0.0010","v":"10000","q":"18","O":0,"C":86400000,"F":0,"L":18150,"n":18151}"#;

pub const EXECUTION_REPORT: &str = r#"{"e":"executionReport","E":1499405658658,"s":"ETHBTC","c":"mUvoqJxFIILMdfAW5iGSOW","S":"BUY","o":"LIMIT","f":"GTC","q":"1.00000000","p":"0.10264410","P":"0.00000000","F":"0.00000000","g":-1,"C":"","x":"NEW","X":"NEW","r":"NONE","i":4293153,"l":"0.00000000","z":"0.00000000","L":"0.00000000","n":"0","N":null,"T":1499405658657,"t":-1,"I":8641984,"w":true,"m":false,"M":false,"O":1499405658657,"Z":"0.00000000","Y":"0.00000000","Q":"0.00000000"}"#;

pub fn ticker_batch(count: usize) -> String {
    format!("[{}]", vec![TICKER; count].join(","))
}
