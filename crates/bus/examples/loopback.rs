//! Two buses in one process, joined by a pair of Tokio channels

use bus::{Adapter, Bus, Message, MessageCallback, Reply};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One end of an in-process link
struct ChannelAdapter {
    outbound: mpsc::UnboundedSender<Message>,
    listeners: Arc<Mutex<Vec<MessageCallback>>>,
}

impl ChannelAdapter {
    fn pair() -> (Arc<Self>, Arc<Self>) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::spawn(a_tx, b_rx), Self::spawn(b_tx, a_rx))
    }

    fn spawn(
        outbound: mpsc::UnboundedSender<Message>,
        mut inbound: mpsc::UnboundedReceiver<Message>,
    ) -> Arc<Self> {
        let listeners: Arc<Mutex<Vec<MessageCallback>>> = Arc::default();
        let pump = listeners.clone();
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let callbacks = match pump.lock() {
                    Ok(callbacks) => callbacks.clone(),
                    Err(_) => break,
                };
                for callback in callbacks {
                    callback(message.clone());
                }
            }
        });
        Arc::new(Self {
            outbound,
            listeners,
        })
    }
}

impl Adapter for ChannelAdapter {
    fn send(&self, message: Message) {
        let _ = self.outbound.send(message);
    }

    fn add_listener(&self, callback: MessageCallback) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(callback);
        }
    }

    fn destroy(&self) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.clear();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let (left, right) = ChannelAdapter::pair();
    let client = Bus::new(left);
    let server = Bus::new(right);

    server.register_request_handler("sum", |data| {
        let total: i64 = data
            .as_array()
            .map(|items| items.iter().filter_map(|v| v.as_i64()).sum())
            .unwrap_or(0);
        Reply::ok(json!(total))
    })?;
    server.register_request_handler("later", |data| {
        Reply::deferred(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
            Ok::<_, String>(data)
        })
    })?;

    println!("sum = {}", client.request("sum", Some(json!([1, 2, 3]))).await?);
    println!("later = {}", client.request("later", Some(json!("done"))).await?);

    match client.request("missing", None).await {
        Ok(value) => println!("unexpected: {}", value),
        Err(e) => println!("missing -> {}", e),
    }

    client.destroy();
    server.destroy();
    Ok(())
}
