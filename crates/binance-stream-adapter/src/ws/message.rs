/*
[INPUT]:  Raw stream payload text per channel kind
[OUTPUT]: Normalized event records (or a Decode error)
[POS]:    WebSocket layer - message transformer and channel kind dispatch
[UPDATE]: When adding channel kinds or user event types
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::http::{Result, StreamError};
use crate::types::{
    AccountUpdate, CandleEvent, DepthEvent, ExecutionReport, KlineInterval, PartialDepthEvent,
    PartialDepthWire, RawUserEvent, TickerEvent, TradeEvent, UserEvent, normalize_symbol,
    validate_depth_level,
};
use crate::ws::channel::MessageHandler;

pub const ALL_TICKERS_PATH: &str = "!ticker@arr";

const MESSAGE_SAMPLE_LIMIT: usize = 3;
const RAW_LOG_MAX_BYTES: usize = 512;

fn decode<'a, T: Deserialize<'a>>(channel: &'static str, raw: &'a str) -> Result<T> {
    serde_json::from_str(raw).map_err(|source| StreamError::Decode { channel, source })
}

pub fn decode_depth(raw: &str) -> Result<DepthEvent> {
    decode("depth", raw)
}

pub fn decode_partial_depth(raw: &str, symbol: &str, level: u8) -> Result<PartialDepthEvent> {
    let wire: PartialDepthWire = decode("partialDepth", raw)?;
    Ok(PartialDepthEvent {
        symbol: symbol.trim().to_ascii_uppercase(),
        level,
        last_update_id: wire.last_update_id,
        bids: wire.bids,
        asks: wire.asks,
    })
}

pub fn decode_candle(raw: &str) -> Result<CandleEvent> {
    decode("candles", raw)
}

pub fn decode_trade(raw: &str) -> Result<TradeEvent> {
    decode("trades", raw)
}

pub fn decode_ticker(raw: &str) -> Result<TickerEvent> {
    decode("ticker", raw)
}

/// One batch of `!ticker@arr`; the output keeps the batch length and order
pub fn decode_all_tickers(raw: &str) -> Result<Vec<TickerEvent>> {
    decode("allTickers", raw)
}

type UserEventDecoder = fn(Value) -> serde_json::Result<UserEvent>;

const USER_EVENT_DECODERS: &[(&str, UserEventDecoder)] = &[
    ("outboundAccountInfo", decode_account as UserEventDecoder),
    ("outboundAccountPosition", decode_account as UserEventDecoder),
    ("executionReport", decode_execution_report as UserEventDecoder),
];

fn decode_account(value: Value) -> serde_json::Result<UserEvent> {
    AccountUpdate::deserialize(value).map(UserEvent::Account)
}

fn decode_execution_report(value: Value) -> serde_json::Result<UserEvent> {
    ExecutionReport::deserialize(value).map(|report| UserEvent::ExecutionReport(Box::new(report)))
}

#[derive(Deserialize)]
struct Discriminator {
    #[serde(rename = "e")]
    event_type: String,
}

/// Decode a user data stream payload, dispatching on its `e` discriminator.
///
/// Event types without a dedicated record pass through as [`RawUserEvent`].
pub fn decode_user_event(raw: &str) -> Result<UserEvent> {
    let value: Value = decode("userData", raw)?;
    let Discriminator { event_type } = Discriminator::deserialize(&value)
        .map_err(|source| StreamError::Decode {
            channel: "userData",
            source,
        })?;

    let decoder = USER_EVENT_DECODERS
        .iter()
        .find(|(name, _)| *name == event_type)
        .map(|(_, decoder)| *decoder);

    match decoder {
        Some(decoder) => decoder(value).map_err(|source| StreamError::Decode {
            channel: "userData",
            source,
        }),
        None => {
            let mut fields = match value {
                Value::Object(fields) => fields,
                _ => serde_json::Map::new(),
            };
            fields.remove("e");
            Ok(UserEvent::Other(RawUserEvent { event_type, fields }))
        }
    }
}

/// Channel kind with its kind-specific parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamKind {
    Depth,
    PartialDepth { level: u8 },
    Candles { interval: KlineInterval },
    Trades,
    Ticker,
    AllTickers,
}

impl StreamKind {
    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Depth => "depth",
            StreamKind::PartialDepth { .. } => "partialDepth",
            StreamKind::Candles { .. } => "candles",
            StreamKind::Trades => "trades",
            StreamKind::Ticker => "ticker",
            StreamKind::AllTickers => "allTickers",
        }
    }

    /// `false` only for the single shared all-tickers channel
    pub fn is_per_symbol(&self) -> bool {
        !matches!(self, StreamKind::AllTickers)
    }

    pub fn validate(&self) -> Result<()> {
        if let StreamKind::PartialDepth { level } = self {
            validate_depth_level(*level)?;
        }
        Ok(())
    }

    /// Channel path for `symbol`. The all-tickers path ignores the symbol.
    pub fn path(&self, symbol: &str) -> Result<String> {
        self.validate()?;
        if !self.is_per_symbol() {
            return Ok(ALL_TICKERS_PATH.to_string());
        }

        let symbol = normalize_symbol(symbol)?;
        Ok(match self {
            StreamKind::Depth => format!("{symbol}@depth"),
            StreamKind::PartialDepth { level } => format!("{symbol}@depth{level}"),
            StreamKind::Candles { interval } => format!("{symbol}@kline_{interval}"),
            StreamKind::Trades => format!("{symbol}@aggTrade"),
            StreamKind::Ticker => format!("{symbol}@ticker"),
            StreamKind::AllTickers => ALL_TICKERS_PATH.to_string(),
        })
    }

    /// Decode one payload of this kind. `symbol` is only used by partial depth,
    /// whose payload does not name its symbol.
    pub fn decode(&self, symbol: &str, raw: &str) -> Result<MarketEvent> {
        Ok(match self {
            StreamKind::Depth => MarketEvent::Depth(decode_depth(raw)?),
            StreamKind::PartialDepth { level } => {
                MarketEvent::PartialDepth(decode_partial_depth(raw, symbol, *level)?)
            }
            StreamKind::Candles { .. } => MarketEvent::Candle(decode_candle(raw)?),
            StreamKind::Trades => MarketEvent::Trade(decode_trade(raw)?),
            StreamKind::Ticker => MarketEvent::Ticker(decode_ticker(raw)?),
            StreamKind::AllTickers => MarketEvent::AllTickers(decode_all_tickers(raw)?),
        })
    }
}

/// Normalized market event of any channel kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "channel", content = "data", rename_all = "camelCase")]
pub enum MarketEvent {
    Depth(DepthEvent),
    PartialDepth(PartialDepthEvent),
    Candle(CandleEvent),
    Trade(TradeEvent),
    Ticker(TickerEvent),
    AllTickers(Vec<TickerEvent>),
}

/// Wrap a decoder and a callback into a channel message handler.
///
/// Decoded events go to `callback`; decode failures are logged and skipped.
pub(crate) fn decoding_handler<T, D, C>(
    label: impl Into<String>,
    decode: D,
    callback: Arc<C>,
) -> MessageHandler
where
    T: 'static,
    D: Fn(&str) -> Result<T> + Send + Sync + 'static,
    C: Fn(T) + Send + Sync + ?Sized + 'static,
{
    let label = label.into();
    let samples = AtomicUsize::new(0);
    Arc::new(move |raw: &str| match decode(raw) {
        Ok(event) => {
            log_message_sample(&samples, &label, raw);
            callback(event);
        }
        Err(err) => log_decode_failure(&label, &err, raw),
    })
}

/// Log the first few decoded messages of one channel; returns whether this one was logged
fn log_message_sample(samples: &AtomicUsize, label: &str, raw: &str) -> bool {
    let count = samples.fetch_add(1, Ordering::Relaxed);
    let sampled = count < MESSAGE_SAMPLE_LIMIT;
    if sampled {
        debug!(
            sample_index = count + 1,
            sample_limit = MESSAGE_SAMPLE_LIMIT,
            channel = %label,
            bytes = raw.len(),
            message = %truncate_for_log(raw, RAW_LOG_MAX_BYTES),
            "stream message sample"
        );
    }
    sampled
}

pub(crate) fn log_decode_failure(label: &str, err: &StreamError, raw: &str) {
    warn!(
        channel = %label,
        error = %err,
        bytes = raw.len(),
        message = %truncate_for_log(raw, RAW_LOG_MAX_BYTES),
        "stream message decode failed; skipped"
    );
}

pub(crate) fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PriceLevel, Side};
    use rstest::rstest;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::Mutex;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn level(price: &str, quantity: &str) -> PriceLevel {
        PriceLevel {
            price: dec(price),
            quantity: dec(quantity),
        }
    }

    fn depth_raw(bids: &str, asks: &str) -> String {
        format!(
            r#"{{"e":"depthUpdate","E":123456789,"s":"BNBBTC","U":157,"u":160,"b":{bids},"a":{asks}}}"#
        )
    }

    #[rstest]
    #[case("[]", 0)]
    #[case(r#"[["0.0024","10"]]"#, 1)]
    #[case(r#"[["0.0024","10"],["0.0023","5"],["0.0022","1.5"]]"#, 3)]
    fn test_depth_levels_keep_raw_order(#[case] levels: &str, #[case] expected: usize) {
        let event = decode_depth(&depth_raw(levels, levels)).unwrap();
        assert_eq!(event.bid_depth.len(), expected);
        assert_eq!(event.ask_depth, event.bid_depth);

        let raw: Vec<Vec<String>> = serde_json::from_str(levels).unwrap();
        for (parsed, raw) in event.bid_depth.iter().zip(&raw) {
            assert_eq!(*parsed, level(&raw[0], &raw[1]));
        }
    }

    #[test]
    fn test_depth_event_fields() {
        let event = decode_depth(&depth_raw(r#"[["0.0024","10"]]"#, r#"[["0.0026","100"]]"#)).unwrap();
        assert_eq!(event.event_type, "depthUpdate");
        assert_eq!(event.event_time, 123456789);
        assert_eq!(event.symbol, "BNBBTC");
        assert_eq!(event.first_update_id, 157);
        assert_eq!(event.update_id, 160);
        assert_eq!(event.ask_depth, vec![level("0.0026", "100")]);
    }

    #[test]
    fn test_depth_serializes_without_short_codes() {
        let event = decode_depth(&depth_raw(r#"[["0.0024","10"]]"#, "[]")).unwrap();
        let value = serde_json::to_value(&event).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        for key in &keys {
            assert!(key.len() > 1, "short key {key} leaked");
        }
        assert_eq!(
            value["bidDepth"],
            serde_json::json!([{"price": "0.0024", "quantity": "10"}])
        );
    }

    #[test]
    fn test_partial_depth_carries_subscription() {
        let raw = r#"{"lastUpdateId":160,"bids":[["0.0024","10"]],"asks":[["0.0026","100"],["0.0027","1"]]}"#;
        let event = decode_partial_depth(raw, "btcusdt", 5).unwrap();
        assert_eq!(event.symbol, "BTCUSDT");
        assert_eq!(event.level, 5);
        assert_eq!(event.last_update_id, 160);
        assert_eq!(event.bids.len(), 1);
        assert_eq!(event.asks.len(), 2);
    }

    #[test]
    fn test_candle_is_flattened() {
        let raw = r#"{"e":"kline","E":123456789,"s":"BNBBTC","k":{"t":123400000,"T":123460000,"s":"BNBBTC","i":"1m","f":100,"L":200,"o":"0.0010","c":"0.0020","h":"0.0025","l":"0.0015","v":"1000","n":100,"x":false,"q":"1.0000","V":"500","Q":"0.500","B":"123456"}}"#;
        let event = decode_candle(raw).unwrap();
        assert_eq!(event.interval, KlineInterval::OneMinute);
        assert_eq!(event.open, dec("0.0010"));
        assert_eq!(event.close, dec("0.0020"));
        assert_eq!(event.high, dec("0.0025"));
        assert_eq!(event.low, dec("0.0015"));
        assert_eq!(event.trades, 100);
        assert_eq!(event.first_trade_id, 100);
        assert_eq!(event.last_trade_id, 200);
        assert!(!event.is_final);
        assert_eq!(event.quote_buy_volume, dec("0.500"));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["interval"], "1m");
        assert_eq!(value["isFinal"], false);
        assert!(value.get("k").is_none());
    }

    #[test]
    fn test_trade_fields() {
        let raw = r#"{"e":"aggTrade","E":123456789,"s":"BNBBTC","a":12345,"p":"0.001","q":"100","f":100,"l":105,"T":123456785,"m":true,"M":true}"#;
        let event = decode_trade(raw).unwrap();
        assert_eq!(event.trade_id, 12345);
        assert_eq!(event.price, dec("0.001"));
        assert_eq!(event.quantity, dec("100"));
        assert_eq!(event.first_trade_id, 100);
        assert_eq!(event.last_trade_id, 105);
        assert_eq!(event.trade_time, 123456785);
        assert!(event.maker);
    }

    const TICKER: &str = r#"{"e":"24hrTicker","E":123456789,"s":"BNBBTC","p":"0.0015","P":"250.00","w":"0.0018","x":"0.0009","c":"0.0025","Q":"10","b":"0.0024","B":"10","a":"0.0026","A":"100","o":"0.0010","h":"0.0025","l":"0.0010","v":"10000","q":"18","O":0,"C":86400000,"F":0,"L":18150,"n":18151}"#;

    #[test]
    fn test_ticker_fields() {
        let event = decode_ticker(TICKER).unwrap();
        assert_eq!(event.price_change_percent, dec("250.00"));
        assert_eq!(event.best_bid_qnt, dec("10"));
        assert_eq!(event.best_ask_qnt, dec("100"));
        assert_eq!(event.cur_day_close, dec("0.0025"));
        assert_eq!(event.last_trade_id, 18150);
        assert_eq!(event.total_trades, 18151);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(4)]
    fn test_all_tickers_keeps_batch_length(#[case] count: usize) {
        let raw = format!("[{}]", vec![TICKER; count].join(","));
        assert_eq!(decode_all_tickers(&raw).unwrap().len(), count);
    }

    #[test]
    fn test_user_account_events() {
        for event_type in ["outboundAccountInfo", "outboundAccountPosition"] {
            let raw = format!(
                r#"{{"e":"{event_type}","E":1564034571105,"u":1564034571073,"B":[{{"a":"ETH","f":"10000.000000","l":"1.5"}}]}}"#
            );
            let UserEvent::Account(update) = decode_user_event(&raw).unwrap() else {
                panic!("expected account update");
            };
            assert_eq!(update.event_time, 1564034571105);
            assert_eq!(update.last_update_time, Some(1564034571073));
            assert_eq!(update.balances["ETH"].available, dec("10000"));
            assert_eq!(update.balances["ETH"].locked, dec("1.5"));

            let json = serde_json::to_value(&update).unwrap();
            assert_eq!(json["lastUpdateTime"], 1564034571073u64);
            assert!(json.get("u").is_none());
        }

        let raw = r#"{"e":"outboundAccountInfo","E":1,"B":[]}"#;
        let UserEvent::Account(update) = decode_user_event(raw).unwrap() else {
            panic!("expected account update");
        };
        assert_eq!(update.last_update_time, None);
        assert!(serde_json::to_value(&update).unwrap().get("lastUpdateTime").is_none());
    }

    #[test]
    fn test_user_execution_report() {
        let raw = r#"{"e":"executionReport","E":1499405658658,"s":"ETHBTC","c":"mUvoqJxFIILMdfAW5iGSOW","S":"BUY","o":"LIMIT","f":"GTC","q":"1.00000000","p":"0.10264410","P":"0.00000000","F":"0.00000000","g":-1,"C":"","x":"NEW","X":"NEW","r":"NONE","i":4293153,"l":"0.00000000","z":"0.00000000","L":"0.00000000","n":"0","N":null,"T":1499405658657,"t":-1,"I":8641984,"w":true,"m":false,"M":false,"O":1499405658657,"Z":"0.00000000","Y":"0.00000000","Q":"0.00000000"}"#;
        let event = decode_user_event(raw).unwrap();
        assert_eq!(event.event_type(), "executionReport");
        let UserEvent::ExecutionReport(report) = &event else {
            panic!("expected execution report");
        };
        assert_eq!(report.side, Side::Buy);
        assert_eq!(report.order_id, 4293153);
        assert_eq!(report.trade_id, -1);
        assert_eq!(report.commission_asset, None);
        assert_eq!(report.is_order_working, Some(true));
        assert_eq!(report.creation_time, Some(1499405658657));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["eventType"], "executionReport");
        assert_eq!(value["newClientOrderId"], "mUvoqJxFIILMdfAW5iGSOW");
        assert_eq!(value["orderStatus"], "NEW");
    }

    #[test]
    fn test_user_unknown_event_passes_through() {
        let raw = r#"{"e":"balanceUpdate","E":1573200697110,"a":"BTC","d":"100.00000000","T":1573200697068}"#;
        let event = decode_user_event(raw).unwrap();
        assert_eq!(event.event_type(), "balanceUpdate");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "eventType": "balanceUpdate",
                "E": 1573200697110u64,
                "a": "BTC",
                "d": "100.00000000",
                "T": 1573200697068u64
            })
        );
    }

    #[rstest]
    #[case("not json")]
    #[case(r#"{"E":1}"#)]
    #[case(r#"{"e":"executionReport","E":1}"#)]
    fn test_user_decode_failures(#[case] raw: &str) {
        assert!(matches!(
            decode_user_event(raw),
            Err(StreamError::Decode { channel: "userData", .. })
        ));
    }

    #[rstest]
    #[case(StreamKind::Depth, "BTCUSDT", "btcusdt@depth")]
    #[case(StreamKind::PartialDepth { level: 10 }, "BTCUSDT", "btcusdt@depth10")]
    #[case(StreamKind::Candles { interval: KlineInterval::OneHour }, "EthUsdt", "ethusdt@kline_1h")]
    #[case(StreamKind::Trades, "bnbbtc", "bnbbtc@aggTrade")]
    #[case(StreamKind::Ticker, "BNBBTC", "bnbbtc@ticker")]
    #[case(StreamKind::AllTickers, "", "!ticker@arr")]
    fn test_stream_kind_paths(#[case] kind: StreamKind, #[case] symbol: &str, #[case] path: &str) {
        assert_eq!(kind.path(symbol).unwrap(), path);
    }

    #[test]
    fn test_stream_kind_rejects_bad_parameters() {
        assert!(StreamKind::PartialDepth { level: 7 }.path("btcusdt").unwrap_err().is_config_error());
        assert!(StreamKind::Depth.path("  ").unwrap_err().is_config_error());
    }

    #[test]
    fn test_stream_kind_deserializes_from_tag() {
        let kind: StreamKind =
            serde_json::from_str(r#"{"kind":"candles","interval":"5m"}"#).unwrap();
        assert_eq!(kind, StreamKind::Candles { interval: KlineInterval::FiveMinutes });
    }

    #[test]
    fn test_market_event_is_tagged() {
        let event = StreamKind::AllTickers.decode("", &format!("[{TICKER}]")).unwrap();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["channel"], "allTickers");
        assert_eq!(value["data"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_decoding_handler_skips_undecodable_messages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = decoding_handler(
            "btcusdt@aggTrade",
            decode_trade,
            Arc::new(move |event: TradeEvent| sink.lock().unwrap().push(event.trade_id)),
        );
        handler("{broken");
        handler(r#"{"e":"aggTrade","E":1,"s":"BTCUSDT","a":7,"p":"1","q":"1","f":1,"l":1,"T":1,"m":false}"#);
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("abcdef", 3), "abc...");
        assert_eq!(truncate_for_log("éé", 3), "é...");
    }

    #[test]
    fn test_message_samples_are_counted_per_channel() {
        let depth = AtomicUsize::new(0);
        let trades = AtomicUsize::new(0);

        let logged: Vec<bool> = (0..4)
            .map(|_| log_message_sample(&depth, "btcusdt@depth", "{}"))
            .collect();
        assert_eq!(logged, vec![true, true, true, false]);
        assert!(log_message_sample(&trades, "btcusdt@aggTrade", "{}"));
    }
}
