//! Host page and embedded widget exchanging typed requests and events

use bus::{Bus, TypedEvent, TypedRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use window::{LogLevel, MemoryWindow, WindowAdapter, WindowAdapterOptions};

struct Greet;

impl TypedRequest for Greet {
    const NAME: &'static str = "greet";
    type Params = String;
    type Output = String;
}

#[derive(Debug, Serialize, Deserialize)]
struct Resized {
    width: u32,
    height: u32,
}

impl TypedEvent for Resized {
    const NAME: &'static str = "resized";
    type Payload = Resized;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let host = MemoryWindow::new("https://app.example");
    let widget = MemoryWindow::new("https://widget.example");
    MemoryWindow::embed(&host, &widget);

    let options = WindowAdapterOptions::new()
        .with_channel_id("demo")
        .with_available_channel_ids(bus::ChannelId::from("demo"))
        .with_log_level(LogLevel::Verbose);

    let host_bus = Bus::new(Arc::new(WindowAdapter::create_by_window(
        &host,
        widget.handle("https://app.example"),
        options.clone().with_origins("https://widget.example".to_string()),
    )?));
    let widget_bus = Bus::new(Arc::new(WindowAdapter::create_child(&widget, options)?));

    widget_bus.serve::<Greet, _, String>(|name| Ok(format!("Hello, {}!", name)))?;
    host_bus.subscribe::<Resized, _>(|size| {
        println!("Widget resized to {}x{}", size.width, size.height);
        Ok(())
    })?;

    let greeting = host_bus.call::<Greet>(&"host".to_string()).await?;
    println!("Widget says: {}", greeting);

    widget_bus.emit::<Resized>(&Resized {
        width: 640,
        height: 480,
    })?;
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    host_bus.destroy();
    widget_bus.destroy();

    Ok(())
}
