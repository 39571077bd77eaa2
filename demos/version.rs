//! Version probe - connect to a DevTools endpoint and print the browser version.
//!
//! This example demonstrates:
//! - Connecting over WebSocket with `WebSocketTransport::connect`
//! - Registering an event handler before the connection starts
//! - Sending commands and closing the dispatcher
//!
//! # Running
//!
//! ```sh
//! chromium --headless --remote-debugging-port=9222 &
//! # Take webSocketDebuggerUrl from http://127.0.0.1:9222/json/version
//! RUST_LOG=devtools_socket=debug cargo run --example version -- ws://127.0.0.1:9222/devtools/browser/<id>
//! ```

use devtools_socket::transport::WebSocketTransport;
use devtools_socket::Dispatcher;
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Params of `Target.targetCreated`.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TargetCreated {
    target_info: TargetInfo,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TargetInfo {
    target_id: String,
    #[serde(rename = "type")]
    kind: String,
    url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = std::env::args()
        .nth(1)
        .ok_or("usage: version <webSocketDebuggerUrl>")?;

    let transport = WebSocketTransport::connect(&url).await?;
    let dispatcher = Dispatcher::builder()
        .on("Target.targetCreated", |created: TargetCreated| async move {
            let info = created.target_info;
            println!("target {} ({}): {}", info.target_id, info.kind, info.url);
        })
        .start(transport);

    let version = dispatcher.send("Browser.getVersion", None).await?;
    println!("product:   {}", version["product"]);
    println!("protocol:  {}", version["protocolVersion"]);
    println!("userAgent: {}", version["userAgent"]);

    dispatcher
        .send("Target.setDiscoverTargets", Some(json!({"discover": true})))
        .await?;

    // Give already open targets a moment to be reported.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    dispatcher.close().await;
    Ok(())
}
