/*
[INPUT]:  Raw stream payloads (one-letter field codes)
[OUTPUT]: Normalized event records with documented field names
[POS]:    Data layer - normalized event shapes per channel kind
[UPDATE]: When the exchange adds fields to a stream payload
*/

//! Normalized event records.
//!
//! `Deserialize` reads the exchange wire format (one-letter field codes);
//! `Serialize` writes the normalized camelCase names only.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::{self, Deserializer, IgnoredAny, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use super::enums::{KlineInterval, Side};

/// One order book level.
///
/// On the wire a level is a `[price, quantity]` array; trailing elements are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceLevel {
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
}

impl<'de> Deserialize<'de> for PriceLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PriceLevelVisitor;

        impl<'de> Visitor<'de> for PriceLevelVisitor {
            type Value = PriceLevel;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a [price, quantity] array")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<PriceLevel, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let price: Decimal = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let quantity: Decimal = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(PriceLevel { price, quantity })
            }
        }

        deserializer.deserialize_seq(PriceLevelVisitor)
    }
}

/// Events that carry an exchange event time (epoch milliseconds)
pub trait Timestamped {
    fn event_time(&self) -> u64;

    fn event_datetime(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.event_time())
    }
}

pub fn millis_to_datetime(millis: u64) -> Option<DateTime<Utc>> {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

/// Order book delta (`{symbol}@depth`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct DepthEvent {
    #[serde(rename(deserialize = "e"))]
    pub event_type: String,
    #[serde(rename(deserialize = "E"))]
    pub event_time: u64,
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "U"))]
    pub first_update_id: u64,
    #[serde(rename(deserialize = "u"))]
    pub update_id: u64,
    #[serde(rename(deserialize = "b"))]
    pub bid_depth: Vec<PriceLevel>,
    #[serde(rename(deserialize = "a"))]
    pub ask_depth: Vec<PriceLevel>,
}

/// Order book snapshot (`{symbol}@depth{level}`).
///
/// The snapshot payload does not name its symbol, so the subscription
/// parameters are carried along.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialDepthEvent {
    pub symbol: String,
    pub level: u8,
    pub last_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PartialDepthWire {
    pub last_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Candle tick (`{symbol}@kline_{interval}`), flattened out of the nested kline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CandleWire", rename_all = "camelCase")]
pub struct CandleEvent {
    pub event_type: String,
    pub event_time: u64,
    pub symbol: String,
    pub start_time: u64,
    pub close_time: u64,
    pub first_trade_id: i64,
    pub last_trade_id: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub open: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub close: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume: Decimal,
    pub trades: u64,
    pub interval: KlineInterval,
    pub is_final: bool,
    #[serde(with = "rust_decimal::serde::str")]
    pub quote_volume: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub buy_volume: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub quote_buy_volume: Decimal,
}

#[derive(Debug, Deserialize)]
struct CandleWire {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "E")]
    event_time: u64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "k")]
    kline: KlineWire,
}

#[derive(Debug, Deserialize)]
struct KlineWire {
    #[serde(rename = "t")]
    start_time: u64,
    #[serde(rename = "T")]
    close_time: u64,
    #[serde(rename = "i")]
    interval: KlineInterval,
    #[serde(rename = "f")]
    first_trade_id: i64,
    #[serde(rename = "L")]
    last_trade_id: i64,
    #[serde(rename = "o", with = "rust_decimal::serde::str")]
    open: Decimal,
    #[serde(rename = "c", with = "rust_decimal::serde::str")]
    close: Decimal,
    #[serde(rename = "h", with = "rust_decimal::serde::str")]
    high: Decimal,
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    low: Decimal,
    #[serde(rename = "v", with = "rust_decimal::serde::str")]
    volume: Decimal,
    #[serde(rename = "n")]
    trades: u64,
    #[serde(rename = "x")]
    is_final: bool,
    #[serde(rename = "q", with = "rust_decimal::serde::str")]
    quote_volume: Decimal,
    #[serde(rename = "V", with = "rust_decimal::serde::str")]
    buy_volume: Decimal,
    #[serde(rename = "Q", with = "rust_decimal::serde::str")]
    quote_buy_volume: Decimal,
}

impl From<CandleWire> for CandleEvent {
    fn from(wire: CandleWire) -> Self {
        let k = wire.kline;
        Self {
            event_type: wire.event_type,
            event_time: wire.event_time,
            symbol: wire.symbol,
            start_time: k.start_time,
            close_time: k.close_time,
            first_trade_id: k.first_trade_id,
            last_trade_id: k.last_trade_id,
            open: k.open,
            high: k.high,
            low: k.low,
            close: k.close,
            volume: k.volume,
            trades: k.trades,
            interval: k.interval,
            is_final: k.is_final,
            quote_volume: k.quote_volume,
            buy_volume: k.buy_volume,
            quote_buy_volume: k.quote_buy_volume,
        }
    }
}

/// Aggregated trade (`{symbol}@aggTrade`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct TradeEvent {
    #[serde(rename(deserialize = "e"))]
    pub event_type: String,
    #[serde(rename(deserialize = "E"))]
    pub event_time: u64,
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "a"))]
    pub trade_id: u64,
    #[serde(rename(deserialize = "p"), with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(rename(deserialize = "q"), with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    #[serde(rename(deserialize = "f"))]
    pub first_trade_id: u64,
    #[serde(rename(deserialize = "l"))]
    pub last_trade_id: u64,
    #[serde(rename(deserialize = "T"))]
    pub trade_time: u64,
    #[serde(rename(deserialize = "m"))]
    pub maker: bool,
}

/// 24h rolling window ticker (`{symbol}@ticker`, and each element of `!ticker@arr`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct TickerEvent {
    #[serde(rename(deserialize = "e"))]
    pub event_type: String,
    #[serde(rename(deserialize = "E"))]
    pub event_time: u64,
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "p"), with = "rust_decimal::serde::str")]
    pub price_change: Decimal,
    #[serde(rename(deserialize = "P"), with = "rust_decimal::serde::str")]
    pub price_change_percent: Decimal,
    #[serde(rename(deserialize = "w"), with = "rust_decimal::serde::str")]
    pub weighted_avg: Decimal,
    #[serde(rename(deserialize = "x"), with = "rust_decimal::serde::str")]
    pub prev_day_close: Decimal,
    #[serde(rename(deserialize = "c"), with = "rust_decimal::serde::str")]
    pub cur_day_close: Decimal,
    #[serde(rename(deserialize = "Q"), with = "rust_decimal::serde::str")]
    pub close_trade_quantity: Decimal,
    #[serde(rename(deserialize = "b"), with = "rust_decimal::serde::str")]
    pub best_bid: Decimal,
    #[serde(rename(deserialize = "B"), with = "rust_decimal::serde::str")]
    pub best_bid_qnt: Decimal,
    #[serde(rename(deserialize = "a"), with = "rust_decimal::serde::str")]
    pub best_ask: Decimal,
    #[serde(rename(deserialize = "A"), with = "rust_decimal::serde::str")]
    pub best_ask_qnt: Decimal,
    #[serde(rename(deserialize = "o"), with = "rust_decimal::serde::str")]
    pub open: Decimal,
    #[serde(rename(deserialize = "h"), with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(rename(deserialize = "l"), with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(rename(deserialize = "v"), with = "rust_decimal::serde::str")]
    pub volume: Decimal,
    #[serde(rename(deserialize = "q"), with = "rust_decimal::serde::str")]
    pub volume_quote: Decimal,
    #[serde(rename(deserialize = "O"))]
    pub open_time: u64,
    #[serde(rename(deserialize = "C"))]
    pub close_time: u64,
    #[serde(rename(deserialize = "F"))]
    pub first_trade_id: i64,
    #[serde(rename(deserialize = "L"))]
    pub last_trade_id: i64,
    #[serde(rename(deserialize = "n"))]
    pub total_trades: u64,
}

impl Timestamped for DepthEvent {
    fn event_time(&self) -> u64 {
        self.event_time
    }
}

impl Timestamped for CandleEvent {
    fn event_time(&self) -> u64 {
        self.event_time
    }
}

impl Timestamped for TradeEvent {
    fn event_time(&self) -> u64 {
        self.event_time
    }
}

impl Timestamped for TickerEvent {
    fn event_time(&self) -> u64 {
        self.event_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssetBalance {
    #[serde(with = "rust_decimal::serde::str")]
    pub available: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub locked: Decimal,
}

/// Account balances, keyed by asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "AccountWire", rename_all = "camelCase")]
pub struct AccountUpdate {
    pub event_time: u64,
    /// Time of the last account change (`u`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<u64>,
    pub balances: BTreeMap<String, AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AccountWire {
    #[serde(rename = "E")]
    event_time: u64,
    #[serde(rename = "u", default)]
    last_update_time: Option<u64>,
    #[serde(rename = "B", default)]
    balances: Vec<BalanceWire>,
}

#[derive(Debug, Deserialize)]
struct BalanceWire {
    #[serde(rename = "a")]
    asset: String,
    #[serde(rename = "f", with = "rust_decimal::serde::str")]
    free: Decimal,
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    locked: Decimal,
}

impl From<AccountWire> for AccountUpdate {
    fn from(wire: AccountWire) -> Self {
        let balances = wire
            .balances
            .into_iter()
            .map(|balance| {
                (
                    balance.asset,
                    AssetBalance {
                        available: balance.free,
                        locked: balance.locked,
                    },
                )
            })
            .collect();
        Self {
            event_time: wire.event_time,
            last_update_time: wire.last_update_time,
            balances,
        }
    }
}

/// Order execution report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ExecutionReport {
    #[serde(rename(deserialize = "E"))]
    pub event_time: u64,
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "c"))]
    pub new_client_order_id: String,
    #[serde(rename(deserialize = "S"))]
    pub side: Side,
    #[serde(rename(deserialize = "o"))]
    pub order_type: String,
    #[serde(rename(deserialize = "f"))]
    pub time_in_force: String,
    #[serde(rename(deserialize = "q"), with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    #[serde(rename(deserialize = "p"), with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(rename(deserialize = "x"))]
    pub execution_type: String,
    #[serde(rename(deserialize = "X"))]
    pub order_status: String,
    #[serde(rename(deserialize = "r"))]
    pub order_reject_reason: String,
    #[serde(rename(deserialize = "i"))]
    pub order_id: u64,
    #[serde(rename(deserialize = "T"))]
    pub order_time: u64,
    #[serde(rename(deserialize = "l"), with = "rust_decimal::serde::str")]
    pub last_trade_quantity: Decimal,
    #[serde(rename(deserialize = "z"), with = "rust_decimal::serde::str")]
    pub total_trade_quantity: Decimal,
    #[serde(rename(deserialize = "L"), with = "rust_decimal::serde::str")]
    pub price_last_trade: Decimal,
    #[serde(rename(deserialize = "n"), with = "rust_decimal::serde::str")]
    pub commission: Decimal,
    #[serde(rename(deserialize = "N"), default)]
    pub commission_asset: Option<String>,
    #[serde(rename(deserialize = "t"))]
    pub trade_id: i64,
    #[serde(rename(deserialize = "m"))]
    pub is_buyer_maker: bool,
    #[serde(rename(deserialize = "C"), default)]
    pub original_client_order_id: Option<String>,
    #[serde(
        rename(deserialize = "P"),
        default,
        with = "rust_decimal::serde::str_option"
    )]
    pub stop_price: Option<Decimal>,
    #[serde(
        rename(deserialize = "F"),
        default,
        with = "rust_decimal::serde::str_option"
    )]
    pub iceberg_quantity: Option<Decimal>,
    #[serde(rename(deserialize = "w"), default)]
    pub is_order_working: Option<bool>,
    #[serde(rename(deserialize = "O"), default)]
    pub creation_time: Option<u64>,
    #[serde(
        rename(deserialize = "Z"),
        default,
        with = "rust_decimal::serde::str_option"
    )]
    pub cumulative_quote_quantity: Option<Decimal>,
    #[serde(
        rename(deserialize = "Y"),
        default,
        with = "rust_decimal::serde::str_option"
    )]
    pub last_quote_quantity: Option<Decimal>,
}

/// User stream event whose type has no dedicated record.
///
/// Fields keep their original wire names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawUserEvent {
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Normalized user stream event
#[derive(Debug, Clone, PartialEq)]
pub enum UserEvent {
    Account(AccountUpdate),
    ExecutionReport(Box<ExecutionReport>),
    Other(RawUserEvent),
}

impl UserEvent {
    pub fn event_type(&self) -> &str {
        match self {
            UserEvent::Account(_) => "account",
            UserEvent::ExecutionReport(_) => "executionReport",
            UserEvent::Other(raw) => &raw.event_type,
        }
    }
}

impl Serialize for UserEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        #[serde(tag = "eventType")]
        enum Tagged<'a> {
            #[serde(rename = "account")]
            Account(&'a AccountUpdate),
            #[serde(rename = "executionReport")]
            ExecutionReport(&'a ExecutionReport),
        }

        match self {
            UserEvent::Account(update) => Tagged::Account(update).serialize(serializer),
            UserEvent::ExecutionReport(report) => {
                Tagged::ExecutionReport(report.as_ref()).serialize(serializer)
            }
            UserEvent::Other(raw) => raw.serialize(serializer),
        }
    }
}
