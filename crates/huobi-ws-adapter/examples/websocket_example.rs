/*
[INPUT]:  Market stream endpoint
[OUTPUT]: Live kline updates and one kline snapshot request printed to stdout
[POS]:    Examples - WebSocket session usage
[UPDATE]: When the Session API changes
*/

use huobi_ws_adapter::{Session, SessionConfig};
use tokio::time::{Duration, sleep};

/// Example: one market session with a subscription and a one-shot request
///
/// The session pings every 5 seconds, answers server pings, and reconnects
/// (resubscribing every topic) whenever the connection drops or goes silent.
#[tokio::main]
async fn main() -> huobi_ws_adapter::Result<()> {
    println!("=== Huobi WebSocket Example ===\n");

    let session = Session::market(SessionConfig::default()).await?;
    println!("✓ Connected to {}", session.endpoint());

    session
        .subscribe("market.btcusdt.kline.1min", |topic, msg| {
            println!("{topic}: {}", msg["tick"]);
        })
        .await?;
    println!("✓ Subscribed to market.btcusdt.kline.1min\n");

    let snapshot = session
        .request_with_timeout("market.btcusdt.kline.1min", Duration::from_secs(10))
        .await?;
    println!("Snapshot: {} candles", snapshot["data"].as_array().map_or(0, Vec::len));

    sleep(Duration::from_secs(30)).await;

    session.close();
    session.run().await;
    println!("\n✓ WebSocket example complete");
    Ok(())
}
