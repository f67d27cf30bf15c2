/*
[INPUT]:  Symbols to watch
[OUTPUT]: Live depth, trade and candle events printed to stdout
[POS]:    Examples - market stream subscriptions
[UPDATE]: When subscribe functions change
*/

use binance_stream_adapter::*;
use tokio::time::{Duration, sleep};

/// Example: public market streams
///
/// Every subscribe call opens one channel per symbol and returns one handle;
/// channels reconnect on their own until the handle is torn down.
#[tokio::main]
async fn main() {
    println!("=== Binance Stream Example ===\n");

    let client = StreamClient::new();
    println!("✓ Stream client created ({})", client.base_url());

    let trades = match client.trades(["BTCUSDT", "ETHUSDT"], |trade| {
        println!(
            "trade  {} {} @ {} (maker: {})",
            trade.symbol, trade.quantity, trade.price, trade.maker
        );
    }) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to subscribe to trades: {}", e);
            return;
        }
    };
    println!("✓ Trades: {:?}", trades.paths());

    let candles = match client.candles("BTCUSDT", "1m", |candle| {
        println!(
            "candle {} {} o={} h={} l={} c={} final={}",
            candle.symbol,
            candle.interval,
            candle.open,
            candle.high,
            candle.low,
            candle.close,
            candle.is_final
        );
    }) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to subscribe to candles: {}", e);
            return;
        }
    };
    println!("✓ Candles: {:?}", candles.paths());

    // Validation happens before any connection attempt
    if let Err(e) = client.candles("BTCUSDT", "", |_| {}) {
        println!("✓ Missing interval rejected: {}", e);
    }

    println!("\nStreaming for 10 seconds...\n");
    sleep(Duration::from_secs(10)).await;

    trades.teardown();
    candles.teardown();
    trades.closed().await;
    candles.closed().await;
    println!("\n✓ All channels closed");
}
