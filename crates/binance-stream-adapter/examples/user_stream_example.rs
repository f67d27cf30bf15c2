/*
[INPUT]:  BINANCE_API_KEY environment variable
[OUTPUT]: User data stream events printed to stdout
[POS]:    Examples - user data stream lifecycle
[UPDATE]: When the user stream contract changes
*/

use std::sync::Arc;

use binance_stream_adapter::*;
use tokio::time::{Duration, sleep};

/// Example: user data stream
///
/// The listen key is issued over REST, kept alive in the background, and
/// invalidated on teardown.
#[tokio::main]
async fn main() {
    println!("=== Binance User Stream Example ===\n");

    let api_key = match std::env::var("BINANCE_API_KEY") {
        Ok(key) => key,
        Err(_) => {
            eprintln!("Set BINANCE_API_KEY to run this example");
            return;
        }
    };

    let session = match BinanceClient::new() {
        Ok(client) => client.with_api_key(api_key),
        Err(e) => {
            eprintln!("Failed to create client: {}", e);
            return;
        }
    };

    let client = StreamClient::new().with_session(Arc::new(session));
    let handle = match client
        .user(|event| match event {
            UserEvent::Account(update) => {
                for (asset, balance) in &update.balances {
                    println!("balance {asset}: {} free / {} locked", balance.available, balance.locked);
                }
            }
            UserEvent::ExecutionReport(report) => println!(
                "order {} {} {:?} {} @ {} -> {}",
                report.order_id,
                report.symbol,
                report.side,
                report.quantity,
                report.price,
                report.order_status
            ),
            UserEvent::Other(raw) => println!("event {}: {:?}", raw.event_type, raw.fields),
        })
        .await
    {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to open user stream: {}", e);
            return;
        }
    };
    println!("✓ User stream open\n");

    sleep(Duration::from_secs(60)).await;

    match handle.teardown().await {
        Ok(()) => println!("\n✓ Listen key invalidated, stream closed"),
        Err(e) => eprintln!("\n✗ Teardown error: {}", e),
    }
}
