/*
[INPUT]:  YAML configuration samples
[OUTPUT]: Parsing and validation verification
[POS]:    Integration test layer - configuration
[UPDATE]: When configuration options change
*/

use std::time::Duration;

use binance_stream_adapter::ws::STREAM_BASE_URL;
use binance_stream_adapter::{KlineInterval, ReconnectPolicy, StreamKind};
use binance_stream_tail::TailConfig;
use tokio_test::assert_ok;

const FULL_CONFIG: &str = r#"
stream:
  base_url: wss://testnet.binance.vision/ws
  reconnect:
    mode: exponential
    initial_ms: 500
    max_ms: 8000
  keepalive_secs: 30
api:
  base_url: https://testnet.binance.vision
  api_key: test-api-key
subscriptions:
  - kind: depth
    symbols: [BTCUSDT, ETHUSDT]
  - kind: partial_depth
    level: 10
    symbols: [BNBBTC]
  - kind: candles
    interval: 1m
    symbols: [BTCUSDT]
  - kind: trades
    symbols: [BTCUSDT]
  - kind: all_tickers
user_stream:
  enabled: true
"#;

#[test]
fn test_full_config_parses() {
    let config = assert_ok!(TailConfig::from_yaml(FULL_CONFIG));
    assert_ok!(config.validate());

    let kinds: Vec<StreamKind> = config.subscriptions.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![
            StreamKind::Depth,
            StreamKind::PartialDepth { level: 10 },
            StreamKind::Candles {
                interval: KlineInterval::OneMinute
            },
            StreamKind::Trades,
            StreamKind::AllTickers,
        ]
    );
    assert_eq!(config.subscriptions[0].symbols, vec!["BTCUSDT", "ETHUSDT"]);
    assert!(config.subscriptions[4].symbols.is_empty());

    let stream = config.stream_config();
    assert_eq!(stream.base_url, "wss://testnet.binance.vision/ws");
    assert_eq!(stream.keepalive_interval, Duration::from_secs(30));
    assert_eq!(
        stream.reconnect,
        ReconnectPolicy::Exponential {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(8),
        }
    );
}

#[test]
fn test_defaults() {
    let config = assert_ok!(TailConfig::from_yaml(
        "subscriptions:\n  - kind: ticker\n    symbols: [BTCUSDT]\n"
    ));
    assert_ok!(config.validate());

    let stream = config.stream_config();
    assert_eq!(stream.base_url, STREAM_BASE_URL);
    assert_eq!(stream.reconnect, ReconnectPolicy::Fixed(Duration::from_secs(1)));
    assert_eq!(stream.keepalive_interval, Duration::from_secs(50));
    assert!(!config.user_stream.enabled);
    assert!(config.session_client().unwrap().is_none());
}

#[test]
fn test_validation_failures() {
    let cases = [
        "subscriptions: []\n",
        "subscriptions:\n  - kind: depth\n",
        "subscriptions:\n  - kind: depth\n    symbols: [\"BTC USDT\"]\n",
        "subscriptions:\n  - kind: partial_depth\n    level: 7\n    symbols: [BTCUSDT]\n",
        "stream:\n  keepalive_secs: 0\nsubscriptions:\n  - kind: trades\n    symbols: [BTCUSDT]\n",
        "stream:\n  reconnect:\n    mode: exponential\n    initial_ms: 5000\n    max_ms: 100\nsubscriptions:\n  - kind: trades\n    symbols: [BTCUSDT]\n",
    ];
    for yaml in cases {
        let config = assert_ok!(TailConfig::from_yaml(yaml));
        assert!(config.validate().is_err(), "expected invalid: {yaml}");
    }
}

#[test]
fn test_unknown_interval_is_a_parse_error() {
    let yaml = "subscriptions:\n  - kind: candles\n    interval: 2m\n    symbols: [BTCUSDT]\n";
    assert!(TailConfig::from_yaml(yaml).is_err());
}

#[test]
fn test_missing_file() {
    let err = TailConfig::from_file(std::path::Path::new("/nonexistent/tail.yaml")).unwrap_err();
    assert!(err.to_string().contains("read config file"));
}
